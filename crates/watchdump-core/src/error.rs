//! Error type shared by the codec, merge engine and driver

use crate::source::Window;

/// Boxed collaborator error (database driver, lookup service, ...).
pub type SourceError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal error from a dump run.
///
/// None of these are retried: any error aborts the run and nothing is
/// promoted to the output path.
#[derive(Debug)]
pub enum DumpError {
    /// An accumulator line with fewer than 3 TAB-separated fields or
    /// non-numeric count/namespace.
    MalformedRecord { line: String, reason: &'static str },
    /// Reading an accumulator file failed before a clean end-of-stream.
    StreamRead(std::io::Error),
    /// A batch source returned keys out of order or duplicated.
    UnsortedBatch { window: Window, position: usize },
    /// The batch source or title lookup could not be queried.
    Source(SourceError),
    /// Local I/O while writing, syncing or renaming accumulator files.
    Io(std::io::Error),
    /// Rejected run options.
    InvalidOption(String),
}

impl std::fmt::Display for DumpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedRecord { line, reason } => {
                write!(f, "invalid intermediate file: {reason}: {line:?}")
            }
            Self::StreamRead(e) => write!(f, "error reading from intermediate file: {e}"),
            Self::UnsortedBatch { window, position } => write!(
                f,
                "batch for window {window} is not strictly ascending at row {position}"
            ),
            Self::Source(e) => write!(f, "source query failed: {e}"),
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::InvalidOption(msg) => write!(f, "invalid option: {msg}"),
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StreamRead(e) | Self::Io(e) => Some(e),
            Self::Source(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DumpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl DumpError {
    /// Wrap any collaborator error as [`DumpError::Source`].
    pub fn source_err(e: impl Into<SourceError>) -> Self {
        Self::Source(e.into())
    }

    /// Short failure-kind name for user-visible messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRecord { .. } => "MalformedRecord",
            Self::StreamRead(_) => "StreamReadFailure",
            Self::UnsortedBatch { .. } => "UnsortedBatch",
            Self::Source(_) => "SourceUnavailable",
            Self::Io(_) => "Io",
            Self::InvalidOption(_) => "InvalidOption",
        }
    }
}
