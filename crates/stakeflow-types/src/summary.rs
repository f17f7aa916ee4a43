//! Vote summaries, reward shots and queue records.
//!
//! Every summary splits votes into four buckets:
//!
//! ```text
//!   votes = locking + locked + unlocking + unlocked
//!   available = locking + locked        (staked, not requested for unlock)
//! ```
//!
//! `locking` and `unlocking` are derived, never stored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::BlockNumber;

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Pool-wide vote and interest totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    /// Votes held by the pool and not yet withdrawn.
    pub votes: u64,
    /// Staked votes not requested for unlock.
    pub available: u64,
    /// Part of `available` whose lock period has matured.
    pub locked: u64,
    /// Votes whose unlock period has matured, pending withdrawal.
    pub unlocked: u64,
    /// Operator share of rewards not yet withdrawn.
    pub interest: Decimal,
    /// Lifetime rewards received by the pool.
    pub total_interest: Decimal,
}

impl PoolSummary {
    /// Votes staked but still inside their lock period.
    #[must_use]
    pub fn locking(&self) -> u64 {
        self.available.saturating_sub(self.locked)
    }

    /// Votes requested for unlock but still inside their unlock period.
    #[must_use]
    pub fn unlocking(&self) -> u64 {
        self.votes
            .saturating_sub(self.available)
            .saturating_sub(self.unlocked)
    }
}

/// Per-user vote and interest totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub votes: u64,
    pub available: u64,
    pub locked: u64,
    pub unlocked: u64,
    /// Settled interest not yet claimed.
    pub interest: Decimal,
    /// Lifetime interest claimed.
    pub claimed_interest: Decimal,
}

impl UserSummary {
    #[must_use]
    pub fn locking(&self) -> u64 {
        self.available.saturating_sub(self.locked)
    }

    #[must_use]
    pub fn unlocking(&self) -> u64 {
        self.votes
            .saturating_sub(self.available)
            .saturating_sub(self.unlocked)
    }

    /// True once every vote has been withdrawn.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.votes == 0
    }
}

// ---------------------------------------------------------------------------
// Shots
// ---------------------------------------------------------------------------

/// A user's reward baseline: the index and vote count at their last change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserShot {
    pub available: u64,
    pub acc_reward_per_vote: Decimal,
    pub block: BlockNumber,
}

/// The pool's reward baseline, including the custody balance it has
/// already accounted for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolShot {
    pub available: u64,
    pub acc_reward_per_vote: Decimal,
    pub block: BlockNumber,
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Queue records
// ---------------------------------------------------------------------------

/// Votes travelling through the lock or unlock pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub votes: u64,
    /// First block at which the entry counts as matured.
    pub ready_at: BlockNumber,
}

impl QueueEntry {
    #[must_use]
    pub fn is_ready(&self, now: BlockNumber) -> bool {
        self.ready_at <= now
    }
}

/// A FIFO promise to pay `amount` to `user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemEntry {
    pub user: crate::AccountId,
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_buckets() {
        let summary = PoolSummary {
            votes: 10,
            available: 6,
            locked: 4,
            unlocked: 1,
            ..PoolSummary::default()
        };
        assert_eq!(summary.locking(), 2);
        assert_eq!(summary.unlocking(), 3);
        assert_eq!(
            summary.locking() + summary.locked + summary.unlocking() + summary.unlocked,
            summary.votes
        );
    }

    #[test]
    fn user_empty_after_withdraw() {
        let mut user = UserSummary {
            votes: 1,
            unlocked: 1,
            ..UserSummary::default()
        };
        assert!(!user.is_empty());
        user.votes = 0;
        user.unlocked = 0;
        assert!(user.is_empty());
    }

    #[test]
    fn queue_entry_matures_at_ready_block() {
        let entry = QueueEntry {
            votes: 1,
            ready_at: 100,
        };
        assert!(!entry.is_ready(99));
        assert!(entry.is_ready(100));
    }
}
