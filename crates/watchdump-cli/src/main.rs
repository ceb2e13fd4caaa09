//! watchdump - dump per-title watcher counts from a MediaWiki watchlist
//!
//! Aggregates the watchlist in id windows into a sorted TAB-separated file
//! of `count`, `namespace`, `title`, skipping titles that no longer exist.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod config;
mod dump;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "watchdump")]
#[command(about = "Dump per-title watcher counts from a watchlist table")]
#[command(version)]
pub struct Cli {
    /// Output file (count, namespace, title; TAB-separated)
    pub output: PathBuf,

    /// Watchlist rows per id window [default: 100000]
    #[arg(long)]
    pub batch_size: Option<u64>,

    /// DuckDB database with `watchlist` and `page` tables
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Directory for intermediate files (default: the output's directory)
    #[arg(long)]
    pub work_dir: Option<PathBuf>,

    /// DuckDB memory limit (e.g. "4GB")
    #[arg(long)]
    pub memory_limit: Option<String>,

    /// Stop at the first empty window instead of scanning to the max id
    #[arg(long)]
    pub stop_on_empty_window: bool,

    /// Delete accumulator files left in the work dir by failed runs
    #[arg(long)]
    pub clean_stale: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Config file path (default: ./watchdump.toml or ~/.config/watchdump/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let progress = watchdump_core::ProgressContext::new();

    // TTY: warn unless --debug, the window bar shows activity.
    // non-TTY: info, logs are the only progress indicator.
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !cli.debug } else { false };
    watchdump_core::init_logging(quiet, cli.debug, multi);

    let config = if let Some(path) = &cli.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    let settings = dump::Settings::resolve(&cli, &config)?;
    log::debug!("Settings: {settings:?}");

    let summary = dump::run(&settings, &progress)?;

    eprintln!("\n{}", dump::summary_table(&summary));
    println!(
        " Execution time of script = {:.3} sec.",
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}
