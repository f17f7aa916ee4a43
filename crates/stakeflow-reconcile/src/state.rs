//! Controller-local polling cache.
//!
//! Holds the last lock and vote parameters relayed to the pool so the
//! relay steps can detect upstream changes with a cheap equality check.
//! Losing it is harmless: the next tick relays once more.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stakeflow_types::{BlockNumber, Round, TopicVotes};

/// Escrow lock parameters as last relayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockParams {
    pub amount: Decimal,
    pub unlock_block: BlockNumber,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationState {
    lock: Option<LockParams>,
    votes: Option<(Round, Vec<TopicVotes>)>,
}

impl ReconciliationState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn last_lock(&self) -> Option<LockParams> {
        self.lock
    }

    /// Whether `current` needs relaying.
    ///
    /// A zero lock never relayed before is not a change.
    #[must_use]
    pub fn lock_changed(&self, current: LockParams) -> bool {
        match self.lock {
            Some(cached) => cached != current,
            None => !current.amount.is_zero(),
        }
    }

    pub fn remember_lock(&mut self, params: LockParams) {
        self.lock = Some(params);
    }

    #[must_use]
    pub fn last_votes(&self) -> Option<(Round, &[TopicVotes])> {
        self.votes.as_ref().map(|(round, votes)| (*round, votes.as_slice()))
    }

    /// Whether `tallies` for `round` need relaying.
    ///
    /// All-zero tallies for a round never relayed before are not a change.
    #[must_use]
    pub fn votes_changed(&self, round: Round, tallies: &[TopicVotes]) -> bool {
        match &self.votes {
            Some((cached_round, cached)) if *cached_round == round => cached != tallies,
            _ => tallies
                .iter()
                .any(|t| t.votes.iter().any(|v| !v.is_zero())),
        }
    }

    pub fn remember_votes(&mut self, round: Round, tallies: Vec<TopicVotes>) {
        self.votes = Some((round, tallies));
    }

    /// Forget everything; the next tick relays current escrow state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
