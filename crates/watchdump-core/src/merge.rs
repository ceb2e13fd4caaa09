//! Three-way streaming merge of the prior accumulator with one window
//!
//! Both inputs are strictly ascending by key. The prior accumulator is read
//! one line at a time; the batch is the in-memory result of one window.
//!
//! | comparison          | action                                            |
//! |---------------------|---------------------------------------------------|
//! | `prior < batch[i]`  | emit prior unchanged, advance prior               |
//! | `prior == batch[i]` | emit summed count, advance both                   |
//! | `prior > batch[i]`  | emit `batch[i]` only if its title still exists    |
//!
//! Once either side is exhausted the other is flushed verbatim. Keys flushed
//! from the batch tail, and every key of the very first window, are never
//! existence-checked. This asymmetry is deliberate for output compatibility
//! with earlier dumps, but it means a deleted title whose key sorts after
//! the whole prior accumulator still makes it into the output.

use std::cmp::Ordering;
use std::io::{BufRead, Write};

use crate::codec::{AccumulatorReader, AccumulatorWriter};
use crate::error::DumpError;
use crate::oracle::{ExistenceOracle, TitleLookup};
use crate::record::Record;

/// What happened to each input record during one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Prior records emitted unchanged while the batch was still active
    pub carried: usize,
    /// Keys present on both sides, emitted with summed counts
    pub summed: usize,
    /// New keys that passed the existence check
    pub inserted: usize,
    /// New keys dropped because their title no longer exists
    pub dropped: usize,
    /// Batch records flushed after the prior side ran out (or was absent)
    pub flushed_batch: usize,
    /// Prior records flushed after the batch ran out
    pub flushed_prior: usize,
}

impl MergeStats {
    /// Records written to the new accumulator
    pub fn written(&self) -> usize {
        self.carried + self.summed + self.inserted + self.flushed_batch + self.flushed_prior
    }
}

impl std::ops::AddAssign for MergeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.carried += rhs.carried;
        self.summed += rhs.summed;
        self.inserted += rhs.inserted;
        self.dropped += rhs.dropped;
        self.flushed_batch += rhs.flushed_batch;
        self.flushed_prior += rhs.flushed_prior;
    }
}

/// Fold `batch` into `prior`, writing the new accumulator to `out`.
///
/// `prior` is `None` for the first window, in which case the batch is
/// copied through without any existence filtering.
pub fn merge_window<R, W, L>(
    prior: Option<&mut AccumulatorReader<R>>,
    batch: &[Record],
    oracle: &mut ExistenceOracle<L>,
    out: &mut AccumulatorWriter<W>,
) -> Result<MergeStats, DumpError>
where
    R: BufRead,
    W: Write,
    L: TitleLookup,
{
    let mut stats = MergeStats::default();
    let mut i = 0;

    if let Some(prior) = prior {
        let mut current = prior.next_record()?;

        while i < batch.len() {
            let Some(old) = current.as_ref() else { break };
            let new = &batch[i];
            match old.key.cmp(&new.key) {
                Ordering::Less => {
                    out.write(old)?;
                    stats.carried += 1;
                    current = prior.next_record()?;
                }
                Ordering::Equal => {
                    out.write(&Record {
                        key: new.key.clone(),
                        count: old.count + new.count,
                    })?;
                    stats.summed += 1;
                    current = prior.next_record()?;
                    i += 1;
                }
                Ordering::Greater => {
                    if oracle.exists(&new.key)? {
                        out.write(new)?;
                        stats.inserted += 1;
                    } else {
                        log::debug!("dropping {} (title no longer exists)", new.key);
                        stats.dropped += 1;
                    }
                    i += 1;
                }
            }
        }

        // Batch exhausted: carry the rest of the prior accumulator.
        while let Some(old) = current {
            out.write(&old)?;
            stats.flushed_prior += 1;
            current = prior.next_record()?;
        }
    }

    // Prior exhausted or absent: flush the batch tail unchecked.
    for new in &batch[i..] {
        out.write(new)?;
        stats.flushed_batch += 1;
    }

    Ok(stats)
}
