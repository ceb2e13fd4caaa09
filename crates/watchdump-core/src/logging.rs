//! Logging setup: env_logger, bridged through indicatif when a bar is shown
//!
//! The chosen level applies to the watchdump crates only. Dependencies
//! (duckdb, tempfile) stay at `warn` unless `RUST_LOG` says otherwise.

use indicatif::MultiProgress;

/// Log targets of the watchdump binary and libraries.
const OWN_TARGETS: &[&str] = &["watchdump", "watchdump_core", "watchdump_db"];

/// Filter directive used when `RUST_LOG` is unset.
fn default_filter(quiet: bool, debug: bool) -> String {
    let level = if debug {
        "debug"
    } else if quiet {
        return "warn".to_string();
    } else {
        "info"
    };
    let mut filter = String::from("warn");
    for target in OWN_TARGETS {
        filter.push_str(&format!(",{target}={level}"));
    }
    filter
}

/// Padded level label.
fn label(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    }
}

/// Records from outside watchdump are prefixed with their target.
fn foreign_prefix(target: &str) -> String {
    let crate_name = target.split("::").next().unwrap_or(target);
    if OWN_TARGETS.contains(&crate_name) {
        String::new()
    } else {
        format!("{target}: ")
    }
}

/// Prints through indicatif `MultiProgress` so lines don't tear the window bar.
struct BarLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl log::Log for BarLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let level = record.level();
            let line = format!(
                "[{}{}\x1b[0m] {}{}",
                ansi(level),
                label(level),
                foreign_prefix(record.target()),
                record.args()
            );
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger.
///
/// `RUST_LOG` overrides the filter picked from `quiet`/`debug`. With `multi`
/// set, lines go through the progress bars; otherwise plain uncolored lines
/// suitable for cron mail and log aggregation. A second call keeps the
/// first logger.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(quiet, debug)),
    );

    if let Some(multi) = multi {
        let logger = builder.build();
        let max_level = logger.filter();
        let bar_logger = BarLogger {
            inner: logger,
            multi: multi.clone(),
        };
        if log::set_boxed_logger(Box::new(bar_logger)).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = builder
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}{}",
                    buf.timestamp_seconds(),
                    label(record.level()),
                    foreign_prefix(record.target()),
                    record.args()
                )
            })
            .try_init();
    }
}
