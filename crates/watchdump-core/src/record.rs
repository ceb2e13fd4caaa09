//! Aggregation keys and counted records

use std::fmt;

use crate::error::DumpError;
use crate::source::Window;

/// Aggregation bucket: a (namespace, title) pair.
///
/// Field order drives the derived ordering: namespace ascending, then title
/// in byte order (same as codepoint order for UTF-8).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    pub namespace: i32,
    pub title: String,
}

impl Key {
    pub fn new(namespace: i32, title: impl Into<String>) -> Self {
        Self {
            namespace,
            title: title.into(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.title)
    }
}

/// Number of distinct watchers seen so far for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Key,
    pub count: u64,
}

impl Record {
    pub fn new(namespace: i32, title: impl Into<String>, count: u64) -> Self {
        Self {
            key: Key::new(namespace, title),
            count,
        }
    }
}

/// Check that a fetched batch is strictly ascending by key.
///
/// The merge walks both inputs in lockstep, so an out-of-order or duplicated
/// key would silently corrupt the accumulator.
pub fn ensure_sorted(batch: &[Record], window: Window) -> Result<(), DumpError> {
    match batch.windows(2).position(|w| w[0].key >= w[1].key) {
        Some(i) => Err(DumpError::UnsortedBatch {
            window,
            position: i + 1,
        }),
        None => Ok(()),
    }
}
