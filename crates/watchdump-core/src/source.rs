//! Batch source contract and ID window iteration

use std::fmt;

use crate::error::DumpError;
use crate::record::Record;

/// First identifier visited by a run.
pub const FIRST_ID: u64 = 1;

/// Half-open identifier range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn new(start: u64, size: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(size),
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Grouped-count access to the watchlist table.
pub trait BatchSource {
    /// Highest identifier present, or `None` for an empty table.
    fn max_id(&mut self) -> Result<Option<u64>, DumpError>;

    /// Grouped counts for all rows with an identifier inside `window`.
    ///
    /// Implementations must return records strictly ascending by key; the
    /// driver rejects anything else.
    fn fetch_window(&mut self, window: Window) -> Result<Vec<Record>, DumpError>;
}

impl<S: BatchSource + ?Sized> BatchSource for &mut S {
    fn max_id(&mut self) -> Result<Option<u64>, DumpError> {
        (**self).max_id()
    }

    fn fetch_window(&mut self, window: Window) -> Result<Vec<Record>, DumpError> {
        (**self).fetch_window(window)
    }
}

/// Contiguous windows from [`FIRST_ID`] up to and including `max_id`.
#[derive(Debug, Clone)]
pub struct Windows {
    next: Option<u64>,
    size: u64,
    max_id: u64,
}

impl Windows {
    /// `size` must be non-zero.
    pub fn new(size: u64, max_id: u64) -> Self {
        debug_assert!(size > 0);
        Self {
            next: Some(FIRST_ID),
            size,
            max_id,
        }
    }
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let start = self.next.filter(|&s| s <= self.max_id)?;
        let window = Window::new(start, self.size);
        // The last window may end at u64::MAX; nothing lies beyond it.
        self.next = start.checked_add(self.size);
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match self.next {
            Some(s) if s <= self.max_id => (self.max_id - s) / self.size + 1,
            _ => 0,
        };
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Windows {}
