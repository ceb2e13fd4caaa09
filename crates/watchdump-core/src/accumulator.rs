//! Accumulator versions on disk
//!
//! Each window produces a new immutable version that reads the previous one
//! as input. A version is only ever released after its successor has been
//! committed (flushed, synced and closed), so a crash between windows never
//! loses the last complete accumulator.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};

use crate::codec::{AccumulatorReader, AccumulatorWriter};

/// Buffer size for accumulator reads and writes (256KB)
const IO_BUF_SIZE: usize = 256 * 1024;

const FILE_PREFIX: &str = "watchdump-";
const FILE_SUFFIX: &str = ".tsv";

/// A new accumulator version being written.
///
/// Dropping it without [`commit`](Self::commit) deletes the partial file.
pub struct PendingVersion {
    writer: AccumulatorWriter<BufWriter<NamedTempFile>>,
}

impl std::fmt::Debug for PendingVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingVersion")
            .field("written", &self.writer.written())
            .finish_non_exhaustive()
    }
}

impl PendingVersion {
    /// Create an empty pending version inside `work_dir`.
    pub fn create(work_dir: &Path) -> std::io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(FILE_PREFIX)
            .suffix(FILE_SUFFIX)
            .tempfile_in(work_dir)?;
        Ok(Self {
            writer: AccumulatorWriter::new(BufWriter::with_capacity(IO_BUF_SIZE, file)),
        })
    }

    pub fn writer(&mut self) -> &mut AccumulatorWriter<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    /// Flush, fsync and close the file, making it a complete version.
    pub fn commit(self) -> std::io::Result<AccumulatorVersion> {
        let records = self.writer.written();
        let buffered = self.writer.finish()?;
        let file = buffered.into_inner().map_err(|e| e.into_error())?;
        file.as_file().sync_all()?;
        Ok(AccumulatorVersion {
            path: file.into_temp_path(),
            records,
        })
    }
}

/// A complete, immutable accumulator file. Deleted on drop.
pub struct AccumulatorVersion {
    path: TempPath,
    records: usize,
}

impl std::fmt::Debug for AccumulatorVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulatorVersion")
            .field("path", &self.path())
            .field("records", &self.records)
            .finish()
    }
}

impl AccumulatorVersion {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records in this version
    pub fn records(&self) -> usize {
        self.records
    }

    /// Open a streaming reader over this version.
    pub fn open(&self) -> std::io::Result<AccumulatorReader<BufReader<File>>> {
        let file = File::open(&self.path)?;
        Ok(AccumulatorReader::new(BufReader::with_capacity(
            IO_BUF_SIZE,
            file,
        )))
    }

    /// Move this version to `output`, replacing any existing file.
    ///
    /// Rename is atomic within a filesystem. When the work dir lives on a
    /// different device the file is copied beside `output` first and then
    /// renamed, so `output` is never observed half-written. On failure the
    /// version is handed back inside the error, still on disk.
    pub fn promote(self, output: &Path) -> Result<PathBuf, PromoteError> {
        let records = self.records;
        match self.path.persist(output) {
            Ok(()) => Ok(output.to_path_buf()),
            Err(e) if is_cross_device(&e.error) => {
                log::debug!(
                    "rename to {} crosses devices, copying instead",
                    output.display()
                );
                match copy_into_place(&e.path, output) {
                    // Dropping `e.path` removes the source copy.
                    Ok(()) => Ok(output.to_path_buf()),
                    Err(error) => Err(PromoteError {
                        error,
                        version: Self {
                            path: e.path,
                            records,
                        },
                    }),
                }
            }
            Err(e) => Err(PromoteError {
                error: e.error,
                version: Self {
                    path: e.path,
                    records,
                },
            }),
        }
    }

    /// Leave the file on disk and return its path.
    pub fn keep(self) -> std::io::Result<PathBuf> {
        self.path.keep().map_err(|e| e.error)
    }
}

/// A failed [`AccumulatorVersion::promote`], returning the version intact.
#[derive(Debug)]
pub struct PromoteError {
    pub error: std::io::Error,
    pub version: AccumulatorVersion,
}

impl std::fmt::Display for PromoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "failed to promote {}: {}",
            self.version.path().display(),
            self.error
        )
    }
}

impl std::error::Error for PromoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::CrossesDevices
}

/// Copy `src` to `<output>.tmp`, sync it, then rename over `output`.
fn copy_into_place(src: &Path, output: &Path) -> std::io::Result<()> {
    let mut tmp_name = output.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let result = (|| {
        fs::copy(src, &tmp_path)?;
        File::open(&tmp_path)?.sync_all()?;
        fs::rename(&tmp_path, output)
    })();
    if result.is_err() && tmp_path.exists() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Remove accumulator files left behind by an earlier failed run.
pub fn cleanup_stale_versions(work_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(work_dir)? {
        let path = entry?.path();
        let is_stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(FILE_PREFIX) && n.ends_with(FILE_SUFFIX));
        if is_stale && path.is_file() {
            log::warn!("Removing stale accumulator file: {}", path.display());
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    fn write_version(dir: &Path, records: &[Record]) -> AccumulatorVersion {
        let mut pending = PendingVersion::create(dir).unwrap();
        for r in records {
            pending.writer().write(r).unwrap();
        }
        pending.commit().unwrap()
    }

    fn dir_entries(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn commit_then_read_back() {
        let dir = TempDir::new().unwrap();
        let records = vec![Record::new(0, "A", 1), Record::new(1, "B", 2)];
        let version = write_version(dir.path(), &records);
        assert_eq!(version.records(), 2);

        let mut reader = version.open().unwrap();
        assert_eq!(reader.next_record().unwrap(), Some(records[0].clone()));
        assert_eq!(reader.next_record().unwrap(), Some(records[1].clone()));
        assert_eq!(reader.next_record().unwrap(), None);
    }

    #[test]
    fn version_names_use_prefix_and_suffix() {
        let dir = TempDir::new().unwrap();
        let version = write_version(dir.path(), &[]);
        let name = version.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("watchdump-"));
        assert!(name.ends_with(".tsv"));
    }

    #[test]
    fn dropped_version_is_deleted() {
        let dir = TempDir::new().unwrap();
        let version = write_version(dir.path(), &[Record::new(0, "A", 1)]);
        let path = version.path().to_path_buf();
        assert!(path.exists());
        drop(version);
        assert!(!path.exists());
    }

    #[test]
    fn uncommitted_pending_is_discarded() {
        let dir = TempDir::new().unwrap();
        let mut pending = PendingVersion::create(dir.path()).unwrap();
        pending.writer().write(&Record::new(0, "A", 1)).unwrap();
        assert_eq!(dir_entries(dir.path()), 1);
        drop(pending);
        assert_eq!(dir_entries(dir.path()), 0);
    }

    #[test]
    fn promote_replaces_existing_output() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("watchlist.tsv");
        fs::write(&output, "old contents\n").unwrap();

        let version = write_version(dir.path(), &[Record::new(0, "A", 3)]);
        let src = version.path().to_path_buf();
        let promoted = version.promote(&output).unwrap();

        assert_eq!(promoted, output);
        assert_eq!(fs::read_to_string(&output).unwrap(), "3\t0\tA\n");
        assert!(!src.exists());
    }

    #[test]
    fn failed_promote_hands_version_back() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("missing").join("watchlist.tsv");

        let version = write_version(dir.path(), &[Record::new(0, "A", 3)]);
        let src = version.path().to_path_buf();
        let err = version.promote(&output).unwrap_err();

        assert!(!output.exists());
        assert_eq!(err.version.path(), src.as_path());
        assert_eq!(err.version.records(), 1);
        assert_eq!(fs::read_to_string(&src).unwrap(), "3\t0\tA\n");
        assert!(err.to_string().contains("failed to promote"));
    }

    #[test]
    fn keep_survives_drop() {
        let dir = TempDir::new().unwrap();
        let version = write_version(dir.path(), &[Record::new(0, "A", 1)]);
        let kept = version.keep().unwrap();
        assert!(kept.exists());
    }

    #[test]
    fn copy_into_place_writes_target() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.tsv");
        let output = dir.path().join("out.tsv");
        fs::write(&src, "1\t0\tA\n").unwrap();
        copy_into_place(&src, &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "1\t0\tA\n");
        assert!(!dir.path().join("out.tsv.tmp").exists());
    }

    #[test]
    fn cleanup_removes_only_accumulator_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("watchdump-abc123.tsv"), b"1\t0\tA\n").unwrap();
        fs::write(dir.path().join("watchdump.toml"), b"").unwrap();
        fs::write(dir.path().join("output.tsv"), b"keep").unwrap();

        assert_eq!(cleanup_stale_versions(dir.path()).unwrap(), 1);
        assert!(!dir.path().join("watchdump-abc123.tsv").exists());
        assert!(dir.path().join("watchdump.toml").exists());
        assert!(dir.path().join("output.tsv").exists());
    }
}
