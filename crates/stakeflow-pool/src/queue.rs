//! Lock / unlock pipelines.
//!
//! A [`VotePowerQueue`] holds [`QueueEntry`] records in arrival order. An
//! entry matures at its `ready_at` block; matured entries are popped by
//! [`VotePowerQueue::collect_matured`] on the next mutating call and counted
//! by [`VotePowerQueue::matured_power`] in the meantime so views stay exact.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use stakeflow_types::{BlockNumber, QueueEntry};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VotePowerQueue {
    entries: VecDeque<QueueEntry>,
}

impl VotePowerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, entry: QueueEntry) {
        self.entries.push_back(entry);
    }

    /// Votes in entries that have matured by `now`.
    ///
    /// Entries are not assumed sorted by `ready_at`: a period change can
    /// make a later entry mature before an earlier one.
    #[must_use]
    pub fn matured_power(&self, now: BlockNumber) -> u64 {
        self.entries
            .iter()
            .filter(|e| e.is_ready(now))
            .map(|e| e.votes)
            .sum()
    }

    /// Remove every matured entry and return its total votes.
    pub fn collect_matured(&mut self, now: BlockNumber) -> u64 {
        let matured = self.matured_power(now);
        if matured > 0 {
            self.entries.retain(|e| !e.is_ready(now));
        }
        matured
    }

    /// Votes still travelling through the pipeline at `now`.
    #[must_use]
    pub fn pending_power(&self, now: BlockNumber) -> u64 {
        self.entries
            .iter()
            .filter(|e| !e.is_ready(now))
            .map(|e| e.votes)
            .sum()
    }

    /// Page of entries still pending at `now`, in arrival order.
    #[must_use]
    pub fn pending(&self, now: BlockNumber, offset: usize, limit: usize) -> Vec<QueueEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_ready(now))
            .skip(offset)
            .take(limit)
            .copied()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
