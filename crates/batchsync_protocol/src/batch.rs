//! Batch position carried by every batch envelope.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Position of one envelope in a batched transfer.
///
/// A `batch_count` of zero is the sentinel for a single, unbatched
/// transfer: the only envelope has index 0 and is the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
    /// Zero-based position in the sequence.
    pub batch_index: u32,
    /// Total number of batches, or 0 for an unbatched transfer.
    pub batch_count: u32,
    /// True iff no further envelope follows.
    pub is_last_batch: bool,
}

impl BatchInfo {
    /// The unbatched ("all changes") envelope.
    pub fn single() -> Self {
        Self {
            batch_index: 0,
            batch_count: 0,
            is_last_batch: true,
        }
    }

    /// Envelope `batch_index` of `batch_count`.
    pub fn part(batch_index: u32, batch_count: u32) -> Self {
        Self {
            batch_index,
            batch_count,
            is_last_batch: batch_count > 0 && batch_index + 1 == batch_count,
        }
    }

    /// Returns true if the transfer is a single unit (`batch_count <= 1`).
    pub fn is_unbatched(&self) -> bool {
        self.batch_count <= 1
    }

    /// Returns true if this is the unbatched sentinel envelope.
    pub fn is_single(&self) -> bool {
        self.batch_count == 0 && self.batch_index == 0
    }

    /// Returns true if the receiver should stop after this envelope.
    pub fn ends_transfer(&self) -> bool {
        self.is_last_batch || self.is_unbatched()
    }

    /// Checks the index/count/last-flag invariants.
    ///
    /// A transfer of at most one batch ends after its only envelope
    /// whatever the last-batch flag says, so the flag is only enforced
    /// when `batch_count > 1`.
    pub fn validate(&self) -> ProtocolResult<()> {
        let fail = |reason: &'static str| -> ProtocolResult<()> {
            Err(ProtocolError::InvalidBatchInfo {
                batch_index: self.batch_index,
                batch_count: self.batch_count,
                is_last_batch: self.is_last_batch,
                reason,
            })
        };

        if self.batch_count == 0 {
            if self.batch_index != 0 {
                return fail("unbatched transfer must use index 0");
            }
            return Ok(());
        }

        if self.batch_index >= self.batch_count {
            return fail("batch index out of range");
        }
        let is_final_index = self.batch_index + 1 == self.batch_count;
        if self.is_last_batch && !is_final_index {
            return fail("last batch flag set before the final index");
        }
        if self.batch_count > 1 && is_final_index && !self.is_last_batch {
            return fail("final index not flagged as last batch");
        }
        Ok(())
    }

    /// Builds the batch infos for a transfer split into `chunks` parts.
    ///
    /// One chunk (or none) is sent as the unbatched sentinel.
    pub fn sequence(chunks: usize) -> Vec<BatchInfo> {
        if chunks <= 1 {
            return vec![BatchInfo::single()];
        }
        let count = chunks as u32;
        (0..count).map(|i| BatchInfo::part(i, count)).collect()
    }
}

impl Default for BatchInfo {
    fn default() -> Self {
        Self::single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_is_valid() {
        let info = BatchInfo::single();
        assert!(info.validate().is_ok());
        assert!(info.is_single());
        assert!(info.ends_transfer());
    }

    #[test]
    fn parts_are_valid() {
        for i in 0..3 {
            let info = BatchInfo::part(i, 3);
            assert!(info.validate().is_ok());
            assert_eq!(info.is_last_batch, i == 2);
        }
    }

    #[test]
    fn index_out_of_range() {
        let info = BatchInfo {
            batch_index: 3,
            batch_count: 3,
            is_last_batch: true,
        };
        assert!(matches!(
            info.validate(),
            Err(ProtocolError::InvalidBatchInfo {
                reason: "batch index out of range",
                ..
            })
        ));
    }

    #[test]
    fn early_last_flag_rejected() {
        let info = BatchInfo {
            batch_index: 1,
            batch_count: 3,
            is_last_batch: true,
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn missing_last_flag_rejected() {
        let info = BatchInfo {
            batch_index: 2,
            batch_count: 3,
            is_last_batch: false,
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn unbatched_with_nonzero_index_rejected() {
        let info = BatchInfo {
            batch_index: 1,
            batch_count: 0,
            is_last_batch: true,
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn unbatched_without_last_flag_still_valid() {
        let info = BatchInfo {
            batch_index: 0,
            batch_count: 0,
            is_last_batch: false,
        };
        assert!(info.validate().is_ok());
        assert!(info.ends_transfer());
    }

    #[test]
    fn single_part_counts_as_unbatched() {
        let info = BatchInfo::part(0, 1);
        assert!(info.is_unbatched());
        assert!(!info.is_single());
        assert!(info.validate().is_ok());
    }

    #[test]
    fn sequence_of_chunks() {
        assert_eq!(BatchInfo::sequence(0), vec![BatchInfo::single()]);
        assert_eq!(BatchInfo::sequence(1), vec![BatchInfo::single()]);

        let seq = BatchInfo::sequence(3);
        assert_eq!(seq.len(), 3);
        assert!(seq.iter().all(|b| b.validate().is_ok()));
        assert!(seq[2].is_last_batch);
    }
}
