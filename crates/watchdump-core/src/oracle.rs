//! Title existence checks with a per-run negative cache

use rustc_hash::FxHashSet;

use crate::error::DumpError;
use crate::record::Key;

/// Backing lookup answering whether a title still exists.
///
/// Must give a stable answer per key for the duration of a run.
pub trait TitleLookup {
    fn title_exists(&mut self, key: &Key) -> Result<bool, DumpError>;
}

impl<F: FnMut(&Key) -> bool> TitleLookup for F {
    fn title_exists(&mut self, key: &Key) -> Result<bool, DumpError> {
        Ok(self(key))
    }
}

/// Counters for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleStats {
    /// Calls that reached the backing lookup
    pub lookups: u64,
    /// Calls answered from the negative cache
    pub cache_hits: u64,
    /// Distinct keys found missing
    pub missing: u64,
}

/// Existence oracle owning its negative cache.
///
/// Only `false` answers are memoized; positive answers are cheap to
/// re-check and rarely repeat within a run.
pub struct ExistenceOracle<L> {
    lookup: L,
    missing: FxHashSet<Key>,
    max_cached: Option<usize>,
    stats: OracleStats,
}

impl<L: TitleLookup> ExistenceOracle<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            missing: FxHashSet::default(),
            max_cached: None,
            stats: OracleStats::default(),
        }
    }

    /// Cap the negative cache. Once full, new misses go uncached.
    pub fn with_max_cached(mut self, max_cached: Option<usize>) -> Self {
        self.max_cached = max_cached;
        self
    }

    pub fn exists(&mut self, key: &Key) -> Result<bool, DumpError> {
        if self.missing.contains(key) {
            self.stats.cache_hits += 1;
            return Ok(false);
        }
        // An empty title can never name a page.
        let exists = if key.title.is_empty() {
            false
        } else {
            self.stats.lookups += 1;
            self.lookup.title_exists(key)?
        };
        if !exists {
            self.remember_missing(key);
        }
        Ok(exists)
    }

    fn remember_missing(&mut self, key: &Key) {
        if self.max_cached.is_some_and(|max| self.missing.len() >= max) {
            log::trace!("negative cache full, not caching {key}");
            return;
        }
        if self.missing.insert(key.clone()) {
            self.stats.missing += 1;
        }
    }

    pub fn stats(&self) -> OracleStats {
        self.stats
    }

    pub fn cached_missing(&self) -> usize {
        self.missing.len()
    }
}
