//! watchdump-db: DuckDB-backed watchlist source and page lookup
//!
//! Reads a DuckDB copy of the MediaWiki `watchlist` and `page` tables.
//! The connection is opened read-only; the dump never writes to it.

mod config;
mod sql;

pub use config::DbConfig;

use anyhow::{Context, Result};
use duckdb::{AccessMode, Config, Connection, params};
use watchdump_core::{BatchSource, DumpError, Key, Record, TitleLookup, Window};

/// Watchlist table access, one grouped query per window.
pub struct WatchlistDb {
    conn: Connection,
}

impl WatchlistDb {
    /// Open the database read-only and apply resource settings.
    pub fn open(config: &DbConfig) -> Result<Self> {
        if !config.database.is_file() {
            anyhow::bail!("Database not found: {}", config.database.display());
        }
        let flags = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .context("Failed to build DuckDB config")?;
        let conn = Connection::open_with_flags(&config.database, flags).with_context(|| {
            format!("Failed to open DuckDB database: {}", config.database.display())
        })?;

        let threads = config.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        });
        conn.execute_batch(&sql::session_settings(
            config.memory_limit.as_deref(),
            threads,
        ))
        .context("Failed to configure DuckDB")?;

        log::info!("Opened {}", config.database.display());
        Ok(Self { conn })
    }

    /// Page-table lookup sharing this database.
    pub fn page_lookup(&self) -> Result<PageLookup> {
        let conn = self
            .conn
            .try_clone()
            .context("Failed to clone DuckDB connection")?;
        Ok(PageLookup { conn })
    }
}

impl BatchSource for WatchlistDb {
    fn max_id(&mut self) -> Result<Option<u64>, DumpError> {
        let max = self
            .conn
            .query_row(sql::MAX_WATCHLIST_ID, [], |row| row.get::<_, Option<i64>>(0))
            .map_err(DumpError::source_err)?;
        // Ids below 1 are never visited by the window loop.
        Ok(max.and_then(|m| u64::try_from(m).ok()))
    }

    fn fetch_window(&mut self, window: Window) -> Result<Vec<Record>, DumpError> {
        let start = i64::try_from(window.start).map_err(DumpError::source_err)?;
        let end = i64::try_from(window.end).unwrap_or(i64::MAX);

        let mut stmt = self
            .conn
            .prepare_cached(sql::GROUPED_WINDOW)
            .map_err(DumpError::source_err)?;
        let rows = stmt
            .query_map(params![start, end], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(DumpError::source_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (count, namespace, title) = row.map_err(DumpError::source_err)?;
            records.push(Record {
                key: Key::new(namespace, title),
                count: u64::try_from(count).map_err(DumpError::source_err)?,
            });
        }

        // A non-default collation would order titles differently from the
        // byte order the accumulator uses.
        if !records.is_sorted_by(|a, b| a.key < b.key) {
            log::warn!("Window {window}: database order differs from byte order, re-sorting");
            records.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        }
        Ok(records)
    }
}

/// Existence check against the `page` table.
pub struct PageLookup {
    conn: Connection,
}

impl TitleLookup for PageLookup {
    fn title_exists(&mut self, key: &Key) -> Result<bool, DumpError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql::PAGE_EXISTS)
            .map_err(DumpError::source_err)?;
        stmt.query_row(params![key.namespace, key.title], |row| row.get::<_, bool>(0))
            .map_err(DumpError::source_err)
    }
}
