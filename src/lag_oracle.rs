use std::sync::atomic::{AtomicI64, Ordering};

use crate::errors::KonsumerLagError;

/// Value of [`LagOracle::current_expected_lag`] before any message has been consumed.
pub const UNKNOWN_LAG: i64 = -1;

/// Marks that no offset has been recorded yet.
const NO_OFFSET: i64 = -1;

/// Independently computed expected consumer lag of a single partition.
///
/// Given the number of messages the partition is known to contain, and the highest offset
/// consumed so far, the oracle knows exactly how many messages are still left to consume:
///
/// ```text
/// expected_lag = total_messages - (highest_consumed_offset + 1)
/// ```
///
/// The oracle is designed for a single writer (the consume loop, calling
/// [`LagOracle::record_consumed`]) and any number of readers (statistics callbacks, possibly
/// running on a client-owned thread). The only mutable state is one atomic, so readers always
/// see either the previous or the latest recorded offset, never a torn value.
#[derive(Debug)]
pub struct LagOracle {
    total_messages: i64,
    highest_consumed_offset: AtomicI64,
}

impl LagOracle {
    /// Creates an oracle for a partition that contains exactly `total_messages` messages,
    /// starting at offset `0`.
    pub fn new(total_messages: i64) -> Result<Self, KonsumerLagError> {
        if total_messages <= 0 {
            return Err(KonsumerLagError::InvalidTotalMessages(total_messages));
        }

        Ok(LagOracle {
            total_messages,
            highest_consumed_offset: AtomicI64::new(NO_OFFSET),
        })
    }

    /// Records that the message at `offset` has been consumed, and returns the new expected lag.
    ///
    /// Offsets must be strictly increasing across calls: anything else means the assumption about
    /// in-order delivery within the partition is broken, and the run can't be trusted anymore.
    pub fn record_consumed(&self, offset: i64) -> Result<i64, KonsumerLagError> {
        if !(0..self.total_messages).contains(&offset) {
            return Err(KonsumerLagError::OffsetOutOfRange {
                offset,
                total_messages: self.total_messages,
            });
        }

        // Single writer: a plain load is enough to detect ordering violations.
        let previous = self.highest_consumed_offset.load(Ordering::Acquire);
        if previous != NO_OFFSET && offset <= previous {
            return Err(KonsumerLagError::NonIncreasingOffset { previous, offset });
        }

        self.highest_consumed_offset.store(offset, Ordering::Release);

        Ok(self.lag_after(offset))
    }

    /// Expected lag as of the last recorded offset, or [`UNKNOWN_LAG`] if none was recorded yet.
    pub fn current_expected_lag(&self) -> i64 {
        self.expected_lag().unwrap_or(UNKNOWN_LAG)
    }

    /// Same as [`Self::current_expected_lag`], but [`None`] until the first message is consumed.
    pub fn expected_lag(&self) -> Option<i64> {
        self.highest_consumed_offset().map(|offset| self.lag_after(offset))
    }

    /// Highest offset recorded so far, if any.
    pub fn highest_consumed_offset(&self) -> Option<i64> {
        match self.highest_consumed_offset.load(Ordering::Acquire) {
            NO_OFFSET => None,
            offset => Some(offset),
        }
    }

    /// `true` once at least one message has been consumed.
    pub fn is_active(&self) -> bool {
        self.highest_consumed_offset().is_some()
    }

    pub fn total_messages(&self) -> i64 {
        self.total_messages
    }

    fn lag_after(&self, offset: i64) -> i64 {
        self.total_messages - (offset + 1)
    }
}
