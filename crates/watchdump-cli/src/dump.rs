//! Dump run: resolve settings, open the database, drive, report

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use watchdump_core::{DumpOptions, DumpSummary, ExistenceOracle, ProgressContext, run_dump};
use watchdump_db::{DbConfig, WatchlistDb};

use crate::Cli;
use crate::config::Config;

/// Fully resolved run settings (config file defaults, CLI overrides).
#[derive(Debug)]
pub struct Settings {
    pub output: PathBuf,
    pub db: DbConfig,
    pub options: DumpOptions,
    pub max_cached_missing: Option<usize>,
    pub clean_stale: bool,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Result<Self> {
        let database = cli
            .database
            .clone()
            .or_else(|| config.source.database.as_ref().map(PathBuf::from))
            .context("No database given (use --database, [source].database or WATCHDUMP_DATABASE)")?;

        let work_dir = cli
            .work_dir
            .clone()
            .or_else(|| config.dump.work_dir.clone())
            .unwrap_or_else(|| parent_dir(&cli.output));

        let options = DumpOptions {
            batch_size: cli.batch_size.unwrap_or(config.dump.batch_size),
            work_dir,
            stop_on_empty_window: cli.stop_on_empty_window || config.dump.stop_on_empty_window,
        };

        Ok(Self {
            output: cli.output.clone(),
            db: DbConfig {
                database,
                memory_limit: cli
                    .memory_limit
                    .clone()
                    .or_else(|| config.source.memory_limit.clone()),
                threads: config.source.threads,
            },
            options,
            max_cached_missing: config.oracle.max_cached_missing,
            clean_stale: cli.clean_stale,
        })
    }
}

/// Directory holding `path`, `.` for a bare file name.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn run(settings: &Settings, progress: &ProgressContext) -> Result<DumpSummary> {
    if settings.clean_stale {
        let removed = watchdump_core::accumulator::cleanup_stale_versions(
            &settings.options.work_dir,
        )
        .with_context(|| {
            format!(
                "Failed to clean work dir: {}",
                settings.options.work_dir.display()
            )
        })?;
        log::info!("Removed {removed} stale accumulator files");
    }

    let mut db = WatchlistDb::open(&settings.db)?;
    let mut oracle = ExistenceOracle::new(db.page_lookup()?)
        .with_max_cached(settings.max_cached_missing);

    run_dump(
        &mut db,
        &mut oracle,
        &settings.output,
        &settings.options,
        progress,
    )
    .map_err(|e| {
        let kind = e.kind();
        anyhow::Error::new(e).context(format!("Dump aborted ({kind})"))
    })
}

/// Render the run summary.
pub fn summary_table(summary: &DumpSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Metric").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let max_id = summary
        .max_id
        .map_or_else(|| "(empty)".to_string(), |id| id.to_string());
    table.add_row(vec!["Max watchlist id".to_string(), max_id]);
    table.add_row(vec![
        "Windows".to_string(),
        format!(
            "{} ({} merged, {} empty)",
            summary.windows, summary.merged_windows, summary.empty_windows
        ),
    ]);
    table.add_row(vec!["Records written".to_string(), summary.records.to_string()]);
    table.add_row(vec![
        "Keys summed".to_string(),
        summary.merge.summed.to_string(),
    ]);
    table.add_row(vec![
        "Dropped (missing title)".to_string(),
        summary.merge.dropped.to_string(),
    ]);
    table.add_row(vec![
        "Title lookups".to_string(),
        format!(
            "{} ({} cache hits)",
            summary.oracle.lookups, summary.oracle.cache_hits
        ),
    ]);
    let output = summary
        .output
        .as_ref()
        .map_or_else(|| "(none)".to_string(), |p| p.display().to_string());
    table.add_row(vec!["Output".to_string(), output]);
    table
}
