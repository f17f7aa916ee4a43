//! Adapter to the external proof-of-stake registry.
//!
//! The registry holds the pool's votes on chain. Every call is a fallible
//! remote call; implementations report failures as `RegistryCallFailed`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BlockNumber, PosIdentity, Result, Round, constants::VOTE_OPTION_COUNT};

/// Reward the registry paid the pool for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub epoch: u64,
    /// Votes the pool held during the epoch.
    pub votes: u64,
    pub reward: Decimal,
}

/// The registry's view of the pool's account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    /// Votes staked and not requested for unlock, including in-queue votes.
    pub available: u64,
    /// Part of `available` past its lock period.
    pub locked: u64,
    /// Votes past their unlock period, withdrawable.
    pub unlocked: u64,
    /// Votes still in the lock pipeline.
    pub in_queue: u64,
    /// Votes still in the unlock pipeline.
    pub out_queue: u64,
}

impl AccountStatus {
    /// Votes the registry holds for the pool, not yet withdrawn.
    #[must_use]
    pub fn total_votes(&self) -> u64 {
        self.available + self.out_queue + self.unlocked
    }
}

/// Tally for one governance topic: votes per option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicVotes {
    pub topic: usize,
    pub votes: [Decimal; VOTE_OPTION_COUNT],
}

/// Operations the pool ledger needs from the stake registry.
pub trait StakeRegistry {
    /// Register the pool under `identity` with its initial votes.
    fn register(&mut self, identity: PosIdentity, votes: u64, proof: &[u8]) -> Result<()>;

    fn increase_stake(&mut self, votes: u64) -> Result<()>;

    fn decrease_stake(&mut self, votes: u64) -> Result<()>;

    fn withdraw_stake(&mut self, votes: u64) -> Result<()>;

    /// Current registry epoch height.
    fn epoch_height(&self) -> Result<u64>;

    fn rewards_by_epoch(&self, epoch: u64) -> Result<RewardRecord>;

    fn account_status(&self, identity: &PosIdentity) -> Result<AccountStatus>;

    /// Lock governance power until `unlock_block`.
    fn vote_lock(&mut self, amount: Decimal, unlock_block: BlockNumber) -> Result<()>;

    fn cast_vote(&mut self, round: Round, votes: &[TopicVotes]) -> Result<()>;
}

#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryRegistry;

#[cfg(any(test, feature = "test-helpers"))]
mod memory {
    use std::collections::BTreeMap;

    use rust_decimal::Decimal;

    use crate::{BlockNumber, PosIdentity, Result, Round, StakeflowError};

    use super::{AccountStatus, RewardRecord, StakeRegistry, TopicVotes};

    /// In-memory registry.
    ///
    /// Staked votes count as locked immediately and unstaked votes wait in
    /// the out-queue until withdrawn; the registry does not model periods.
    #[derive(Debug, Default, Clone)]
    pub struct MemoryRegistry {
        identity: Option<PosIdentity>,
        staked: u64,
        unstaking: u64,
        epoch: u64,
        rewards: BTreeMap<u64, RewardRecord>,
        locks: Vec<(Decimal, BlockNumber)>,
        votes: Vec<(Round, Vec<TopicVotes>)>,
        fail_writes: bool,
        fail_reads: bool,
        write_calls: u64,
    }

    impl MemoryRegistry {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every mutating call fail until cleared.
        pub fn set_fail_writes(&mut self, fail: bool) {
            self.fail_writes = fail;
        }

        /// Make every read fail until cleared.
        pub fn set_fail_reads(&mut self, fail: bool) {
            self.fail_reads = fail;
        }

        pub fn set_epoch(&mut self, epoch: u64) {
            self.epoch = epoch;
        }

        pub fn set_reward(&mut self, epoch: u64, votes: u64, reward: Decimal) {
            self.rewards.insert(
                epoch,
                RewardRecord {
                    epoch,
                    votes,
                    reward,
                },
            );
        }

        /// Overwrite the staked count, simulating drift from the pool.
        pub fn force_staked(&mut self, votes: u64) {
            self.staked = votes;
        }

        #[must_use]
        pub fn staked(&self) -> u64 {
            self.staked
        }

        #[must_use]
        pub fn unstaking(&self) -> u64 {
            self.unstaking
        }

        #[must_use]
        pub fn identity(&self) -> Option<PosIdentity> {
            self.identity
        }

        #[must_use]
        pub fn locks(&self) -> &[(Decimal, BlockNumber)] {
            &self.locks
        }

        #[must_use]
        pub fn cast_votes(&self) -> &[(Round, Vec<TopicVotes>)] {
            &self.votes
        }

        /// Number of successful mutating calls.
        #[must_use]
        pub fn write_calls(&self) -> u64 {
            self.write_calls
        }

        fn check_write(&self, op: &str) -> Result<()> {
            if self.fail_writes {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: format!("{op}: injected failure"),
                });
            }
            Ok(())
        }

        fn check_read(&self, op: &str) -> Result<()> {
            if self.fail_reads {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: format!("{op}: injected failure"),
                });
            }
            Ok(())
        }
    }

    impl StakeRegistry for MemoryRegistry {
        fn register(&mut self, identity: PosIdentity, votes: u64, _proof: &[u8]) -> Result<()> {
            self.check_write("register")?;
            if self.identity.is_some() {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: "register: identity already registered".into(),
                });
            }
            self.identity = Some(identity);
            self.staked += votes;
            self.write_calls += 1;
            Ok(())
        }

        fn increase_stake(&mut self, votes: u64) -> Result<()> {
            self.check_write("increase_stake")?;
            self.staked += votes;
            self.write_calls += 1;
            Ok(())
        }

        fn decrease_stake(&mut self, votes: u64) -> Result<()> {
            self.check_write("decrease_stake")?;
            if votes > self.staked {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: format!("decrease_stake: {votes} exceeds staked {}", self.staked),
                });
            }
            self.staked -= votes;
            self.unstaking += votes;
            self.write_calls += 1;
            Ok(())
        }

        fn withdraw_stake(&mut self, votes: u64) -> Result<()> {
            self.check_write("withdraw_stake")?;
            if votes > self.unstaking {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: format!(
                        "withdraw_stake: {votes} exceeds unstaking {}",
                        self.unstaking
                    ),
                });
            }
            self.unstaking -= votes;
            self.write_calls += 1;
            Ok(())
        }

        fn epoch_height(&self) -> Result<u64> {
            self.check_read("epoch_height")?;
            Ok(self.epoch)
        }

        fn rewards_by_epoch(&self, epoch: u64) -> Result<RewardRecord> {
            self.check_read("rewards_by_epoch")?;
            Ok(self.rewards.get(&epoch).cloned().unwrap_or(RewardRecord {
                epoch,
                ..RewardRecord::default()
            }))
        }

        fn account_status(&self, identity: &PosIdentity) -> Result<AccountStatus> {
            self.check_read("account_status")?;
            if self.identity.as_ref() != Some(identity) {
                return Err(StakeflowError::RegistryCallFailed {
                    reason: format!("account_status: unknown identity {identity}"),
                });
            }
            Ok(AccountStatus {
                available: self.staked,
                locked: self.staked,
                unlocked: 0,
                in_queue: 0,
                out_queue: self.unstaking,
            })
        }

        fn vote_lock(&mut self, amount: Decimal, unlock_block: BlockNumber) -> Result<()> {
            self.check_write("vote_lock")?;
            self.locks.push((amount, unlock_block));
            self.write_calls += 1;
            Ok(())
        }

        fn cast_vote(&mut self, round: Round, votes: &[TopicVotes]) -> Result<()> {
            self.check_write("cast_vote")?;
            self.votes.push((round, votes.to_vec()));
            self.write_calls += 1;
            Ok(())
        }
    }
}
