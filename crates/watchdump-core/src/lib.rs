//! Watchdump Core - batched external merge-aggregation of watchlist counts
//!
//! Folds grouped-and-counted windows of a watchlist table into a sorted,
//! disk-resident accumulator, one immutable file version per window.

pub mod accumulator;
pub mod codec;
pub mod driver;
pub mod error;
pub mod logging;
pub mod merge;
pub mod oracle;
pub mod progress;
pub mod record;
pub mod source;

// Re-exports for convenience
pub use accumulator::{AccumulatorVersion, PendingVersion, PromoteError};
pub use codec::{AccumulatorReader, AccumulatorWriter, decode_line, encode_record};
pub use driver::{DEFAULT_BATCH_SIZE, DumpOptions, DumpSummary, run_dump};
pub use error::DumpError;
pub use logging::init_logging;
pub use merge::{MergeStats, merge_window};
pub use oracle::{ExistenceOracle, OracleStats, TitleLookup};
pub use progress::ProgressContext;
pub use record::{Key, Record, ensure_sorted};
pub use source::{BatchSource, Window, Windows};
