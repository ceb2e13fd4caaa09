use std::path::PathBuf;

/// Connection settings for the watchlist database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// DuckDB database file holding the `watchlist` and `page` tables
    pub database: PathBuf,
    /// DuckDB memory limit (e.g. "4GB")
    pub memory_limit: Option<String>,
    /// DuckDB worker threads; defaults to available parallelism
    pub threads: Option<usize>,
}

impl DbConfig {
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            memory_limit: None,
            threads: None,
        }
    }
}
