//! Batch driver: window loop, accumulator versioning and final promotion

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::accumulator::{AccumulatorVersion, PendingVersion};
use crate::error::DumpError;
use crate::merge::{MergeStats, merge_window};
use crate::oracle::{ExistenceOracle, OracleStats, TitleLookup};
use crate::progress::{ProgressContext, fmt_num};
use crate::record::{Record, ensure_sorted};
use crate::source::{BatchSource, Window, Windows};

/// Default window size over the identifier column.
pub const DEFAULT_BATCH_SIZE: u64 = 100_000;

/// Run options. Window size only affects memory and speed, never the output.
#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub batch_size: u64,
    /// Directory for accumulator versions. Should be on the same filesystem
    /// as the output so the final promotion is a plain rename.
    pub work_dir: PathBuf,
    /// Treat the first empty window as end of data (legacy behaviour).
    ///
    /// Off by default: a gap of at least one window inside the identifier
    /// range would otherwise silently truncate the output.
    pub stop_on_empty_window: bool,
}

impl DumpOptions {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            work_dir: work_dir.into(),
            stop_on_empty_window: false,
        }
    }

    pub fn validate(&self) -> Result<(), DumpError> {
        if self.batch_size == 0 {
            return Err(DumpError::InvalidOption(
                "batch size must be at least 1".into(),
            ));
        }
        if !self.work_dir.is_dir() {
            return Err(DumpError::InvalidOption(format!(
                "work dir {} is not a directory",
                self.work_dir.display()
            )));
        }
        Ok(())
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct DumpSummary {
    /// Highest identifier at start, `None` for an empty table
    pub max_id: Option<u64>,
    /// Windows fetched
    pub windows: u64,
    /// Windows that produced a new accumulator version
    pub merged_windows: u64,
    /// Windows with no rows
    pub empty_windows: u64,
    /// Records in the final output
    pub records: usize,
    /// Merge counters summed over all windows
    pub merge: MergeStats,
    pub oracle: OracleStats,
    /// Final output path, `None` when nothing was written
    pub output: Option<PathBuf>,
    pub elapsed: Duration,
}

/// Driver state. Each `Merging` step fully commits its version before the
/// next window is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Advancing,
    Merging(Window),
    Finalizing,
    Done,
}

/// Aggregate the whole source into `output`.
///
/// On success the final accumulator is renamed to `output`; an empty source
/// leaves `output` untouched. On error nothing is promoted, the in-flight
/// version is discarded and the last complete version is kept on disk for
/// inspection.
pub fn run_dump<S, L>(
    source: &mut S,
    oracle: &mut ExistenceOracle<L>,
    output: &Path,
    options: &DumpOptions,
    progress: &ProgressContext,
) -> Result<DumpSummary, DumpError>
where
    S: BatchSource + ?Sized,
    L: TitleLookup,
{
    let started = Instant::now();
    options.validate()?;

    let mut current: Option<AccumulatorVersion> = None;
    let result = drive(source, oracle, output, options, progress, &mut current);

    match result {
        Ok(mut summary) => {
            summary.oracle = oracle.stats();
            log::debug!(
                "Negative cache holds {} titles",
                fmt_num(oracle.cached_missing() as u64)
            );
            summary.elapsed = started.elapsed();
            Ok(summary)
        }
        Err(e) => {
            if let Some(version) = current.take() {
                match version.keep() {
                    Ok(path) => log::error!(
                        "Last complete accumulator left at {}",
                        path.display()
                    ),
                    Err(keep_err) => log::warn!("Failed to keep last accumulator: {keep_err}"),
                }
            }
            Err(e)
        }
    }
}

fn drive<S, L>(
    source: &mut S,
    oracle: &mut ExistenceOracle<L>,
    output: &Path,
    options: &DumpOptions,
    progress: &ProgressContext,
    current: &mut Option<AccumulatorVersion>,
) -> Result<DumpSummary, DumpError>
where
    S: BatchSource + ?Sized,
    L: TitleLookup,
{
    let max_id = source.max_id()?;
    let mut summary = DumpSummary {
        max_id,
        ..Default::default()
    };

    let Some(max_id) = max_id else {
        log::info!("Source table is empty, no output written");
        return Ok(summary);
    };

    let mut windows = Windows::new(options.batch_size, max_id);
    log::info!(
        "Dumping ids 1..={} in {} windows of {}",
        fmt_num(max_id),
        fmt_num(windows.len() as u64),
        fmt_num(options.batch_size)
    );
    let pb = progress.window_bar(windows.len() as u64);

    let mut state = State::Advancing;
    loop {
        state = match state {
            State::Advancing => match windows.next() {
                Some(window) => State::Merging(window),
                None => State::Finalizing,
            },
            State::Merging(window) => {
                summary.windows += 1;
                let batch = source.fetch_window(window)?;
                pb.inc(1);

                if batch.is_empty() {
                    summary.empty_windows += 1;
                    if options.stop_on_empty_window {
                        log::info!("Window {window} is empty, stopping early");
                        State::Finalizing
                    } else {
                        log::debug!("Window {window} is empty, skipping");
                        State::Advancing
                    }
                } else {
                    ensure_sorted(&batch, window)?;
                    let (next, stats) = fold_window(current.as_ref(), &batch, oracle, options)?;
                    log::debug!(
                        "Window {window}: {} grouped rows, {} summed, {} new, {} dropped -> {} records",
                        batch.len(),
                        stats.summed,
                        stats.inserted + stats.flushed_batch,
                        stats.dropped,
                        next.records()
                    );
                    pb.set_message(format!("{} records", fmt_num(next.records() as u64)));
                    summary.merged_windows += 1;
                    summary.merge += stats;
                    // Replacing drops (deletes) the prior version; the new one
                    // is already committed.
                    *current = Some(next);
                    State::Advancing
                }
            }
            State::Finalizing => {
                pb.finish_and_clear();
                if let Some(version) = current.take() {
                    summary.records = version.records();
                    let promoted = version.promote(output).map_err(|e| {
                        // Hand the version back so the error path keeps it.
                        *current = Some(e.version);
                        DumpError::Io(e.error)
                    })?;
                    log::info!(
                        "Wrote {} records to {}",
                        fmt_num(summary.records as u64),
                        promoted.display()
                    );
                    summary.output = Some(promoted);
                } else {
                    log::info!("No rows found, no output written");
                }
                State::Done
            }
            State::Done => break,
        };
    }

    Ok(summary)
}

/// Merge one batch into a fresh version; the prior version is only read.
fn fold_window<L: TitleLookup>(
    prior: Option<&AccumulatorVersion>,
    batch: &[Record],
    oracle: &mut ExistenceOracle<L>,
    options: &DumpOptions,
) -> Result<(AccumulatorVersion, MergeStats), DumpError> {
    let mut pending = PendingVersion::create(&options.work_dir)?;
    let mut reader = prior
        .map(AccumulatorVersion::open)
        .transpose()
        .map_err(DumpError::StreamRead)?;
    let merged = merge_window(reader.as_mut(), batch, oracle, pending.writer());
    let stats = match merged {
        Ok(stats) => stats,
        Err(e) => {
            if let (Some(prior), Some(reader)) = (prior, &reader) {
                log::error!(
                    "Merge failed after line {} of {}",
                    reader.lines_read(),
                    prior.path().display()
                );
            }
            return Err(e);
        }
    };
    drop(reader);
    let version = pending.commit()?;
    Ok((version, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Key;
    use tempfile::TempDir;

    /// Source serving pre-grouped windows by index, recording each fetch.
    struct Scripted {
        max_id: Option<u64>,
        windows: Vec<Vec<Record>>,
        fetched: Vec<Window>,
    }

    impl BatchSource for Scripted {
        fn max_id(&mut self) -> Result<Option<u64>, DumpError> {
            Ok(self.max_id)
        }

        fn fetch_window(&mut self, window: Window) -> Result<Vec<Record>, DumpError> {
            let idx = self.fetched.len();
            self.fetched.push(window);
            Ok(self.windows.get(idx).cloned().unwrap_or_default())
        }
    }

    fn r(title: &str, count: u64) -> Record {
        Record::new(0, title, count)
    }

    fn options(dir: &Path, batch_size: u64) -> DumpOptions {
        DumpOptions {
            batch_size,
            ..DumpOptions::new(dir)
        }
    }

    fn quiet() -> ProgressContext {
        ProgressContext::with_tty(false)
    }

    #[test]
    fn zero_batch_size_rejected() {
        let dir = TempDir::new().unwrap();
        let err = options(dir.path(), 0).validate().unwrap_err();
        assert!(matches!(err, DumpError::InvalidOption(_)));
    }

    #[test]
    fn missing_work_dir_rejected() {
        let dir = TempDir::new().unwrap();
        let err = DumpOptions::new(dir.path().join("nope"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, DumpError::InvalidOption(_)));
    }

    #[test]
    fn empty_window_skipped_by_default() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.tsv");
        let mut source = Scripted {
            max_id: Some(6),
            windows: vec![vec![r("A", 1)], vec![], vec![r("B", 1)]],
            fetched: Vec::new(),
        };
        let mut oracle = ExistenceOracle::new(|_: &Key| true);

        let summary = run_dump(
            &mut source,
            &mut oracle,
            &output,
            &options(dir.path(), 2),
            &quiet(),
        )
        .unwrap();

        assert_eq!(source.fetched.len(), 3);
        assert_eq!(summary.empty_windows, 1);
        assert_eq!(summary.merged_windows, 2);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "1\t0\tA\n1\t0\tB\n");
    }

    #[test]
    fn stop_on_empty_window_truncates() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.tsv");
        let mut source = Scripted {
            max_id: Some(6),
            windows: vec![vec![r("A", 1)], vec![], vec![r("B", 1)]],
            fetched: Vec::new(),
        };
        let mut oracle = ExistenceOracle::new(|_: &Key| true);
        let opts = DumpOptions {
            stop_on_empty_window: true,
            ..options(dir.path(), 2)
        };

        let summary = run_dump(&mut source, &mut oracle, &output, &opts, &quiet()).unwrap();

        assert_eq!(source.fetched.len(), 2);
        assert_eq!(summary.records, 1);
        assert_eq!(std::fs::read_to_string(&output).unwrap(), "1\t0\tA\n");
    }

    #[test]
    fn windows_requested_in_order() {
        let dir = TempDir::new().unwrap();
        let mut source = Scripted {
            max_id: Some(5),
            windows: vec![vec![r("A", 1)]; 3],
            fetched: Vec::new(),
        };
        let mut oracle = ExistenceOracle::new(|_: &Key| true);
        run_dump(
            &mut source,
            &mut oracle,
            &dir.path().join("out.tsv"),
            &options(dir.path(), 2),
            &quiet(),
        )
        .unwrap();
        assert_eq!(
            source.fetched,
            vec![
                Window { start: 1, end: 3 },
                Window { start: 3, end: 5 },
                Window { start: 5, end: 7 },
            ]
        );
    }

    #[test]
    fn unsorted_batch_aborts_without_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.tsv");
        let mut source = Scripted {
            max_id: Some(4),
            windows: vec![vec![r("A", 1)], vec![r("C", 1), r("B", 1)]],
            fetched: Vec::new(),
        };
        let mut oracle = ExistenceOracle::new(|_: &Key| true);

        let err = run_dump(
            &mut source,
            &mut oracle,
            &output,
            &options(dir.path(), 2),
            &quiet(),
        )
        .unwrap_err();

        assert!(matches!(err, DumpError::UnsortedBatch { position: 1, .. }));
        assert!(!output.exists());
    }

    #[test]
    fn only_one_version_on_disk_between_windows() {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir(&work).unwrap();

        struct Peeking<'a> {
            work: &'a Path,
            seen: Vec<usize>,
        }
        impl BatchSource for Peeking<'_> {
            fn max_id(&mut self) -> Result<Option<u64>, DumpError> {
                Ok(Some(4))
            }
            fn fetch_window(&mut self, window: Window) -> Result<Vec<Record>, DumpError> {
                self.seen
                    .push(std::fs::read_dir(self.work).unwrap().count());
                Ok(vec![Record::new(0, format!("T{}", window.start), 1)])
            }
        }

        let mut source = Peeking {
            work: &work,
            seen: Vec::new(),
        };
        let mut oracle = ExistenceOracle::new(|_: &Key| true);
        run_dump(
            &mut source,
            &mut oracle,
            &dir.path().join("out.tsv"),
            &options(&work, 1),
            &quiet(),
        )
        .unwrap();

        assert_eq!(source.seen, vec![0, 1, 1, 1]);
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }
}
