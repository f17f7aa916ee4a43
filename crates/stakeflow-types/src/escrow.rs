//! Adapter to the external vote-escrow (governance) module.
//!
//! Read-only: the controller only ever relays what the escrow reports.

use rust_decimal::Decimal;

use crate::{BlockNumber, Result, Round, constants::VOTE_OPTION_COUNT};

pub trait VoteEscrow {
    /// Total governance power locked in the escrow at `block`.
    fn global_lock_amount(&self, block: BlockNumber) -> Result<Decimal>;

    /// The pool's aggregated votes for `topic` in `round`, per option.
    fn pool_vote_info(&self, round: Round, topic: usize) -> Result<[Decimal; VOTE_OPTION_COUNT]>;

    /// Block at which the latest escrow lock expires.
    fn last_unlock_block(&self) -> Result<BlockNumber>;

    fn current_round(&self) -> Result<Round>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryVoteEscrow;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::collections::HashMap;

    use rust_decimal::Decimal;

    use crate::{
        BlockNumber, Result, Round, StakeflowError, constants::VOTE_OPTION_COUNT,
    };

    use super::VoteEscrow;

    /// In-memory escrow with settable state and failure injection.
    #[derive(Debug, Default, Clone)]
    pub struct MemoryVoteEscrow {
        lock_amount: Decimal,
        last_unlock_block: BlockNumber,
        round: Round,
        votes: HashMap<(Round, usize), [Decimal; VOTE_OPTION_COUNT]>,
        failing: bool,
    }

    impl MemoryVoteEscrow {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_lock(&mut self, amount: Decimal, unlock_block: BlockNumber) {
            self.lock_amount = amount;
            self.last_unlock_block = unlock_block;
        }

        pub fn set_round(&mut self, round: Round) {
            self.round = round;
        }

        pub fn set_votes(&mut self, round: Round, topic: usize, votes: [Decimal; VOTE_OPTION_COUNT]) {
            self.votes.insert((round, topic), votes);
        }

        pub fn set_failing(&mut self, failing: bool) {
            self.failing = failing;
        }

        fn check(&self, op: &str) -> Result<()> {
            if self.failing {
                return Err(StakeflowError::EscrowCallFailed {
                    reason: format!("{op}: injected failure"),
                });
            }
            Ok(())
        }
    }

    impl VoteEscrow for MemoryVoteEscrow {
        fn global_lock_amount(&self, block: BlockNumber) -> Result<Decimal> {
            self.check("global_lock_amount")?;
            if block > self.last_unlock_block {
                return Ok(Decimal::ZERO);
            }
            Ok(self.lock_amount)
        }

        fn pool_vote_info(&self, round: Round, topic: usize) -> Result<[Decimal; VOTE_OPTION_COUNT]> {
            self.check("pool_vote_info")?;
            Ok(self
                .votes
                .get(&(round, topic))
                .copied()
                .unwrap_or([Decimal::ZERO; VOTE_OPTION_COUNT]))
        }

        fn last_unlock_block(&self) -> Result<BlockNumber> {
            self.check("last_unlock_block")?;
            Ok(self.last_unlock_block)
        }

        fn current_round(&self) -> Result<Round> {
            self.check("current_round")?;
            Ok(self.round)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_expires_after_unlock_block() {
        let mut escrow = MemoryVoteEscrow::new();
        escrow.set_lock(Decimal::from(10), 100);
        assert_eq!(escrow.global_lock_amount(100).unwrap(), Decimal::from(10));
        assert_eq!(escrow.global_lock_amount(101).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn unknown_topic_has_no_votes() {
        let escrow = MemoryVoteEscrow::new();
        assert_eq!(
            escrow.pool_vote_info(1, 2).unwrap(),
            [Decimal::ZERO; VOTE_OPTION_COUNT]
        );
    }
}
