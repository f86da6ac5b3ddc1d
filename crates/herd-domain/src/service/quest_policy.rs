//! Quest batching - When a pending quest increment is worth a store write
//!
//! An entry is flushed once it is either old enough (bounding latency) or
//! large enough (bounding how much progress one failed write can delay).

use std::time::Duration;

/// Age-or-size rule for pending quest increments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestBatchPolicy {
    /// Flush entries pending at least this long
    pub max_latency: Duration,
    /// Flush entries that accumulated at least this many counts
    pub max_batch: u64,
}

impl QuestBatchPolicy {
    pub fn new(max_latency: Duration, max_batch: u64) -> Self {
        Self {
            max_latency,
            max_batch,
        }
    }

    /// Whether an entry pending for `age` with `count` accumulated is due
    pub fn is_eligible(&self, age: Duration, count: u64) -> bool {
        age >= self.max_latency || count >= self.max_batch
    }
}

impl Default for QuestBatchPolicy {
    fn default() -> Self {
        Self {
            max_latency: Duration::from_secs(60),
            max_batch: 25,
        }
    }
}
