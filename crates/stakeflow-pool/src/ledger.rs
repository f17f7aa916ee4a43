//! Pool Ledger: the pool's relationship with the stake registry.
//!
//! Tracks per-user votes through the lock and unlock pipelines and accrues
//! staking rewards with a reward-per-vote index:
//!
//! ```text
//!   reward        = balance_of(pool address) - pool_shot.balance
//!   acc          += reward / pool_shot.available
//!   user pending  = (acc - user_shot.acc) * user_shot.available
//!   user part     = pending * share_ratio / RATIO_BASE   (rest to operator)
//! ```
//!
//! Every mutating call runs in three phases:
//!
//! 1. Validate and compute the accrual without touching state
//! 2. Make the fallible external calls (custody transfer, registry)
//! 3. Commit counters, queues and shots, which cannot fail
//!
//! so a call either commits all of its deltas or none of them.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use stakeflow_types::{
    AccountId, BlockNumber, Custody, EventFields, EventJournal, LedgerKind, Operation, PoolConfig,
    PoolShot, PoolSummary, PosIdentity, QueueEntry, Result, Round, StakeRegistry, StakeflowError,
    StakerSet, TopicVotes, UserShot, UserSummary,
    constants::{CFX_PER_VOTE, RATIO_BASE},
    fields, value,
};

use crate::{
    apy::{self, ApyTracker, RewardSection},
    queue::VotePowerQueue,
};

/// Everything the pool knows about one user.
#[derive(Debug, Clone, Default)]
struct UserState {
    /// Counters as of the last collection; matured queue entries are
    /// folded in by [`PoolLedger::user_summary`].
    summary: UserSummary,
    in_queue: VotePowerQueue,
    out_queue: VotePowerQueue,
    shot: UserShot,
}

/// Index movement computed before any state is touched.
#[derive(Debug, Clone)]
struct Accrual {
    acc: Decimal,
    reward: Decimal,
    /// Reward that arrived while no votes were staked.
    unallocated: Decimal,
    section: Option<RewardSection>,
}

/// A user's pending reward split by share ratio.
#[derive(Debug, Clone, Copy, Default)]
struct Settlement {
    user_part: Decimal,
    operator_part: Decimal,
}

/// The staking pool ledger.
pub struct PoolLedger<R: StakeRegistry> {
    registry: R,
    config: PoolConfig,
    owner: AccountId,
    bridge: Option<AccountId>,
    /// Custody account where the registry pays rewards.
    address: AccountId,
    /// Custody account holding staked principal.
    vault: AccountId,
    identity: Option<PosIdentity>,
    block: BlockNumber,

    summary: PoolSummary,
    in_queue: VotePowerQueue,
    out_queue: VotePowerQueue,
    users: HashMap<AccountId, UserState>,
    stakers: StakerSet,
    fee_free: HashSet<AccountId>,

    acc_reward_per_vote: Decimal,
    shot: PoolShot,
    apy: ApyTracker,
    journal: EventJournal,
}

impl<R: StakeRegistry> PoolLedger<R> {
    /// Create an unregistered pool owned by `owner`.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(owner: AccountId, registry: R, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            owner,
            bridge: None,
            address: AccountId::new(),
            vault: AccountId::new(),
            identity: None,
            block: 0,
            summary: PoolSummary::default(),
            in_queue: VotePowerQueue::new(),
            out_queue: VotePowerQueue::new(),
            users: HashMap::new(),
            stakers: StakerSet::new(),
            fee_free: HashSet::new(),
            acc_reward_per_vote: Decimal::ZERO,
            shot: PoolShot::default(),
            apy: ApyTracker::new(),
            journal: EventJournal::new(LedgerKind::Pool),
        })
    }

    // =================================================================
    // Block clock
    // =================================================================

    /// Move the clock to `block`. The clock never goes backwards.
    pub fn set_block(&mut self, block: BlockNumber) {
        if block > self.block {
            self.block = block;
        }
    }

    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block = self.block.saturating_add(blocks);
    }

    #[must_use]
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    // =================================================================
    // Registration and staking
    // =================================================================

    /// Register the pool with the stake registry, staking the owner's
    /// first vote.
    ///
    /// # Errors
    /// - `NotOwner` if `caller` is not the owner
    /// - `PoolAlreadyRegistered` on a second call
    /// - `InvalidVotePower` / `InvalidValue` unless exactly one vote is paid
    /// - `RegistryCallFailed` if the registry rejects; the payment is refunded
    pub fn register<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        identity: PosIdentity,
        votes: u64,
        value: Decimal,
        proof: &[u8],
    ) -> Result<()> {
        self.ensure_owner(&caller)?;
        if self.identity.is_some() {
            return Err(StakeflowError::PoolAlreadyRegistered);
        }
        if votes != 1 {
            return Err(StakeflowError::InvalidVotePower { votes });
        }
        Self::ensure_value(votes, value)?;

        let accrual = self.accrue(custody)?;
        let settlement = self.settle(&caller, accrual.acc)?;
        self.pay_into_vault(custody, &caller, value, "register", |registry| {
            registry.register(identity, votes, proof)
        })?;

        self.identity = Some(identity);
        self.commit_stake(custody, caller, votes, accrual, settlement);
        tracing::info!(identity = %identity, owner = %caller, "pool registered");
        self.emit(Operation::Register, caller, fields([("votes", votes.into()), ("value", value)]));
        Ok(())
    }

    /// Stake `votes` votes paid with `value`.
    ///
    /// # Errors
    /// - `PoolNotRegistered` before registration
    /// - `InvalidVotePower` if `votes` is zero
    /// - `InvalidValue` unless `value == votes * CFX_PER_VOTE`
    /// - custody errors if the user cannot pay
    /// - `RegistryCallFailed` if the registry rejects; the payment is refunded
    pub fn stake<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
        votes: u64,
        value: Decimal,
    ) -> Result<()> {
        self.ensure_registered()?;
        if votes == 0 {
            return Err(StakeflowError::InvalidVotePower { votes });
        }
        Self::ensure_value(votes, value)?;

        let accrual = self.accrue(custody)?;
        let settlement = self.settle(&user, accrual.acc)?;
        self.pay_into_vault(custody, &user, value, "increase_stake", |registry| {
            registry.increase_stake(votes)
        })?;

        self.commit_stake(custody, user, votes, accrual, settlement);
        self.emit(Operation::Stake, user, fields([("votes", votes.into()), ("value", value)]));
        Ok(())
    }

    /// Request `votes` locked votes for unlock.
    ///
    /// # Errors
    /// - `PoolNotRegistered`, `InvalidVotePower` on zero
    /// - `InsufficientLocked` if `votes` exceeds the user's locked votes
    /// - `RegistryCallFailed`
    pub fn unstake<C: Custody>(&mut self, custody: &C, user: AccountId, votes: u64) -> Result<()> {
        self.ensure_registered()?;
        if votes == 0 {
            return Err(StakeflowError::InvalidVotePower { votes });
        }
        let locked = self.user_summary(&user).locked;
        if votes > locked {
            return Err(StakeflowError::InsufficientLocked {
                needed: votes,
                locked,
            });
        }

        let accrual = self.accrue(custody)?;
        let settlement = self.settle(&user, accrual.acc)?;
        self.registry
            .decrease_stake(votes)
            .map_err(|e| registry_failure("decrease_stake", e))?;

        self.commit_accrual(accrual);
        self.collect_matured(&user);
        let ready_at = self.block.saturating_add(self.config.unlock_period);
        let state = self.users.entry(user).or_default();
        apply_settlement(state, &mut self.summary, settlement);
        state.summary.locked -= votes;
        state.summary.available -= votes;
        state.out_queue.enqueue(QueueEntry { votes, ready_at });
        self.summary.locked -= votes;
        self.summary.available -= votes;
        self.out_queue.enqueue(QueueEntry { votes, ready_at });

        self.take_user_shot(&user);
        self.take_pool_shot(custody);
        self.emit(
            Operation::Unstake,
            user,
            fields([("votes", votes.into()), ("ready_at", ready_at.into())]),
        );
        Ok(())
    }

    /// Withdraw `votes` unlocked votes back to the user as value.
    ///
    /// A user left with zero votes is removed from the staker set.
    ///
    /// # Errors
    /// - `PoolNotRegistered`, `InvalidVotePower` on zero
    /// - `InsufficientUnlocked` if `votes` exceeds the user's unlocked votes
    /// - custody errors, `RegistryCallFailed` (payout is reversed)
    pub fn withdraw_stake<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
        votes: u64,
    ) -> Result<()> {
        self.ensure_registered()?;
        if votes == 0 {
            return Err(StakeflowError::InvalidVotePower { votes });
        }
        let unlocked = self.user_summary(&user).unlocked;
        if votes > unlocked {
            return Err(StakeflowError::InsufficientUnlocked {
                needed: votes,
                unlocked,
            });
        }

        let accrual = self.accrue(custody)?;
        let settlement = self.settle(&user, accrual.acc)?;
        let value = value::votes_to_value(votes);
        custody.transfer(&self.vault, &user, value)?;
        if let Err(err) = self.registry.withdraw_stake(votes) {
            tracing::warn!(user = %user, votes, error = %err, "registry withdraw failed; reversing payout");
            if let Err(reverse) = custody.transfer(&user, &self.vault, value) {
                tracing::error!(user = %user, %value, error = %reverse, "payout reversal failed");
            }
            return Err(registry_failure("withdraw_stake", err));
        }

        self.commit_accrual(accrual);
        self.collect_matured(&user);
        let state = self.users.entry(user).or_default();
        apply_settlement(state, &mut self.summary, settlement);
        state.summary.unlocked -= votes;
        state.summary.votes -= votes;
        let emptied = state.summary.is_empty();
        self.summary.unlocked -= votes;
        self.summary.votes -= votes;
        if emptied {
            self.stakers.remove(&user);
            tracing::debug!(user = %user, "staker removed");
        }

        self.take_user_shot(&user);
        self.take_pool_shot(custody);
        self.emit(
            Operation::WithdrawStake,
            user,
            fields([("votes", votes.into()), ("value", value)]),
        );
        Ok(())
    }

    // =================================================================
    // Interest
    // =================================================================

    /// Interest the user could claim right now.
    ///
    /// # Errors
    /// `ArithmeticOverflow` only.
    pub fn user_interest<C: Custody>(&self, custody: &C, user: &AccountId) -> Result<Decimal> {
        let accrual = self.accrue(custody)?;
        let settlement = self.settle(user, accrual.acc)?;
        let settled = self
            .users
            .get(user)
            .map_or(Decimal::ZERO, |s| s.summary.interest);
        Ok(settled + settlement.user_part)
    }

    /// Pay `amount` of the user's interest out of the pool's reward balance.
    ///
    /// # Errors
    /// - `ZeroAmount`
    /// - `InterestNotEnough` if `amount` exceeds the claimable interest
    /// - `PoolBalanceNotEnough` if the pool address cannot cover it
    pub fn claim_interest<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let accrual = self.accrue(custody)?;
        let settlement = self.settle(&user, accrual.acc)?;
        let settled = self
            .users
            .get(&user)
            .map_or(Decimal::ZERO, |s| s.summary.interest);
        let claimable = settled + settlement.user_part;
        if amount > claimable {
            return Err(StakeflowError::InterestNotEnough {
                needed: amount,
                available: claimable,
            });
        }
        let balance = custody.balance_of(&self.address);
        if balance < amount {
            return Err(StakeflowError::PoolBalanceNotEnough {
                needed: amount,
                available: balance,
            });
        }
        custody.transfer(&self.address, &user, amount)?;

        self.commit_accrual(accrual);
        let state = self.users.entry(user).or_default();
        apply_settlement(state, &mut self.summary, settlement);
        state.summary.interest -= amount;
        state.summary.claimed_interest += amount;

        self.take_user_shot(&user);
        self.take_pool_shot(custody);
        self.emit(Operation::ClaimInterest, user, fields([("amount", amount)]));
        Ok(())
    }

    /// Claim everything claimable and return the amount paid.
    ///
    /// # Errors
    /// `NoClaimableInterest` when nothing is claimable, otherwise as
    /// [`Self::claim_interest`].
    pub fn claim_all_interest<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
    ) -> Result<Decimal> {
        let claimable = self.user_interest(custody, &user)?;
        if claimable <= Decimal::ZERO {
            return Err(StakeflowError::NoClaimableInterest);
        }
        self.claim_interest(custody, user, claimable)?;
        Ok(claimable)
    }

    /// Pay the operator's share of rewards to the owner.
    ///
    /// # Errors
    /// - `NotOwner`, `ZeroAmount`
    /// - `InterestNotEnough` if `amount` exceeds the operator interest
    /// - `PoolBalanceNotEnough`
    pub fn withdraw_operator_interest<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        self.ensure_owner(&caller)?;
        if amount <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let accrual = self.accrue(custody)?;
        let available = self.summary.interest + accrual.unallocated;
        if amount > available {
            return Err(StakeflowError::InterestNotEnough {
                needed: amount,
                available,
            });
        }
        let balance = custody.balance_of(&self.address);
        if balance < amount {
            return Err(StakeflowError::PoolBalanceNotEnough {
                needed: amount,
                available: balance,
            });
        }
        custody.transfer(&self.address, &caller, amount)?;

        self.commit_accrual(accrual);
        self.summary.interest -= amount;
        self.take_pool_shot(custody);
        self.emit(
            Operation::WithdrawOperatorInterest,
            caller,
            fields([("amount", amount)]),
        );
        Ok(())
    }

    // =================================================================
    // Administration (owner-gated)
    // =================================================================

    /// # Errors
    /// `NotOwner`.
    pub fn set_pool_name(&mut self, caller: AccountId, name: impl Into<String>) -> Result<()> {
        self.ensure_owner(&caller)?;
        self.config.name = name.into();
        self.emit(Operation::SetPoolName, caller, EventFields::new());
        Ok(())
    }

    /// Applies to votes staked from now on.
    ///
    /// # Errors
    /// `NotOwner`.
    pub fn set_lock_period(&mut self, caller: AccountId, blocks: u64) -> Result<()> {
        self.ensure_owner(&caller)?;
        self.config.lock_period = blocks;
        self.emit(Operation::SetLockPeriod, caller, fields([("blocks", blocks.into())]));
        Ok(())
    }

    /// Applies to votes unstaked from now on.
    ///
    /// # Errors
    /// `NotOwner`.
    pub fn set_unlock_period(&mut self, caller: AccountId, blocks: u64) -> Result<()> {
        self.ensure_owner(&caller)?;
        self.config.unlock_period = blocks;
        self.emit(Operation::SetUnlockPeriod, caller, fields([("blocks", blocks.into())]));
        Ok(())
    }

    /// # Errors
    /// `NotOwner`, `RatioOutOfRange` unless `0 < ratio <= RATIO_BASE`.
    pub fn set_user_share_ratio(&mut self, caller: AccountId, ratio: u64) -> Result<()> {
        self.ensure_owner(&caller)?;
        if ratio == 0 || ratio > RATIO_BASE {
            return Err(StakeflowError::RatioOutOfRange {
                ratio,
                base: RATIO_BASE,
            });
        }
        self.config.user_share_ratio = ratio;
        self.emit(Operation::SetUserShareRatio, caller, fields([("ratio", ratio.into())]));
        Ok(())
    }

    /// Exempt `account` from the operator fee. Returns `false` if it already was.
    ///
    /// # Errors
    /// `NotOwner`.
    pub fn add_to_fee_free_whitelist(&mut self, caller: AccountId, account: AccountId) -> Result<bool> {
        self.ensure_owner(&caller)?;
        let added = self.fee_free.insert(account);
        if added {
            self.emit(Operation::WhitelistAdd, caller, EventFields::new());
        }
        Ok(added)
    }

    /// # Errors
    /// `NotOwner`.
    pub fn remove_from_fee_free_whitelist(
        &mut self,
        caller: AccountId,
        account: &AccountId,
    ) -> Result<bool> {
        self.ensure_owner(&caller)?;
        let removed = self.fee_free.remove(account);
        if removed {
            self.emit(Operation::WhitelistRemove, caller, EventFields::new());
        }
        Ok(removed)
    }

    /// # Errors
    /// `NotOwner`.
    pub fn set_bridge(&mut self, caller: AccountId, bridge: AccountId) -> Result<()> {
        self.ensure_owner(&caller)?;
        self.bridge = Some(bridge);
        tracing::info!(bridge = %bridge, "pool bridge set");
        self.emit(Operation::SetBridge, caller, EventFields::new());
        Ok(())
    }

    // =================================================================
    // Governance passthrough (bridge-gated)
    // =================================================================

    /// # Errors
    /// `NotBridge`, `RegistryCallFailed`.
    pub fn lock_for_vote_power(
        &mut self,
        caller: AccountId,
        amount: Decimal,
        unlock_block: BlockNumber,
    ) -> Result<()> {
        self.ensure_bridge(&caller)?;
        self.registry
            .vote_lock(amount, unlock_block)
            .map_err(|e| registry_failure("vote_lock", e))?;
        self.emit(
            Operation::LockForVotePower,
            caller,
            fields([("amount", amount), ("unlock_block", unlock_block.into())]),
        );
        Ok(())
    }

    /// # Errors
    /// `NotBridge`, `RegistryCallFailed`.
    pub fn cast_vote(&mut self, caller: AccountId, round: Round, votes: &[TopicVotes]) -> Result<()> {
        self.ensure_bridge(&caller)?;
        self.registry
            .cast_vote(round, votes)
            .map_err(|e| registry_failure("cast_vote", e))?;
        self.emit(
            Operation::CastVote,
            caller,
            fields([("round", round.into()), ("topics", votes.len().into())]),
        );
        Ok(())
    }

    // =================================================================
    // Queries
    // =================================================================

    /// Pool totals as of the current block.
    ///
    /// `interest` excludes rewards that reached the pool address since the
    /// last shot; [`Self::user_interest`] includes them.
    #[must_use]
    pub fn pool_summary(&self) -> PoolSummary {
        let mut summary = self.summary.clone();
        summary.locked += self.in_queue.matured_power(self.block);
        summary.unlocked += self.out_queue.matured_power(self.block);
        summary
    }

    /// A user's totals as of the current block.
    #[must_use]
    pub fn user_summary(&self, user: &AccountId) -> UserSummary {
        self.users.get(user).map_or_else(UserSummary::default, |state| {
            let mut summary = state.summary.clone();
            summary.locked += state.in_queue.matured_power(self.block);
            summary.unlocked += state.out_queue.matured_power(self.block);
            summary
        })
    }

    /// Pending lock-pipeline entries for `user`, oldest first.
    #[must_use]
    pub fn user_in_queue(&self, user: &AccountId, offset: usize, limit: usize) -> Vec<QueueEntry> {
        self.users
            .get(user)
            .map(|s| s.in_queue.pending(self.block, offset, limit))
            .unwrap_or_default()
    }

    /// Pending unlock-pipeline entries for `user`, oldest first.
    #[must_use]
    pub fn user_out_queue(&self, user: &AccountId, offset: usize, limit: usize) -> Vec<QueueEntry> {
        self.users
            .get(user)
            .map(|s| s.out_queue.pending(self.block, offset, limit))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn pool_shot(&self) -> &PoolShot {
        &self.shot
    }

    #[must_use]
    pub fn user_shot(&self, user: &AccountId) -> UserShot {
        self.users
            .get(user)
            .map(|s| s.shot.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn acc_reward_per_vote(&self) -> Decimal {
        self.acc_reward_per_vote
    }

    #[must_use]
    pub fn staker_number(&self) -> usize {
        self.stakers.len()
    }

    #[must_use]
    pub fn staker_address(&self, index: usize) -> Option<AccountId> {
        self.stakers.get(index)
    }

    /// Share of rewards `user` keeps, in `RATIO_BASE` units.
    #[must_use]
    pub fn user_share_ratio(&self, user: &AccountId) -> u64 {
        if self.fee_free.contains(user) {
            RATIO_BASE
        } else {
            self.config.user_share_ratio
        }
    }

    #[must_use]
    pub fn is_fee_free(&self, user: &AccountId) -> bool {
        self.fee_free.contains(user)
    }

    /// # Errors
    /// `PoolNotRegistered`.
    pub fn pos_identity(&self) -> Result<PosIdentity> {
        self.identity.ok_or(StakeflowError::PoolNotRegistered)
    }

    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.identity.is_some()
    }

    #[must_use]
    pub fn pool_name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn lock_period(&self) -> u64 {
        self.config.lock_period
    }

    #[must_use]
    pub fn unlock_period(&self) -> u64 {
        self.config.unlock_period
    }

    #[must_use]
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    #[must_use]
    pub fn bridge(&self) -> Option<AccountId> {
        self.bridge
    }

    /// Custody account rewards are paid into.
    #[must_use]
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Custody account holding staked principal.
    #[must_use]
    pub fn vault(&self) -> AccountId {
        self.vault
    }

    #[must_use]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    #[must_use]
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Annualised pool yield in `RATIO_BASE` units over the last 7 days.
    ///
    /// # Errors
    /// `ArithmeticOverflow` only.
    pub fn pool_apy<C: Custody>(&self, custody: &C) -> Result<Decimal> {
        let pending = custody.balance_of(&self.address) - self.shot.balance;
        let section = (pending > Decimal::ZERO).then_some(RewardSection {
            start_block: self.shot.block,
            end_block: self.block,
            available: self.shot.available,
            reward: pending,
        });
        self.apy.apy(self.block, section)
    }

    /// Reward rate over the last `APR_PERIOD_COUNT` registry epochs.
    ///
    /// # Errors
    /// `RegistryCallFailed` if the registry cannot be read.
    pub fn period_reward_rate(&self) -> Result<Decimal> {
        let epoch = self
            .registry
            .epoch_height()
            .map_err(|e| registry_failure("epoch_height", e))?;
        apy::period_reward_rate(&self.registry, epoch)
    }

    // =================================================================
    // Internals
    // =================================================================

    fn ensure_owner(&self, caller: &AccountId) -> Result<()> {
        if *caller != self.owner {
            return Err(StakeflowError::NotOwner { caller: *caller });
        }
        Ok(())
    }

    fn ensure_bridge(&self, caller: &AccountId) -> Result<()> {
        if self.bridge != Some(*caller) {
            return Err(StakeflowError::NotBridge { caller: *caller });
        }
        Ok(())
    }

    fn ensure_registered(&self) -> Result<()> {
        if self.identity.is_none() {
            return Err(StakeflowError::PoolNotRegistered);
        }
        Ok(())
    }

    fn ensure_value(votes: u64, value: Decimal) -> Result<()> {
        let expected = Decimal::from(votes)
            .checked_mul(Decimal::from(CFX_PER_VOTE))
            .ok_or_else(|| StakeflowError::ArithmeticOverflow {
                context: "stake value".into(),
            })?;
        if value != expected {
            return Err(StakeflowError::InvalidValue {
                expected,
                actual: value,
            });
        }
        Ok(())
    }

    /// Move `value` from `payer` into the vault, then run the registry call.
    /// A registry failure refunds the payer.
    fn pay_into_vault<C: Custody>(
        &mut self,
        custody: &mut C,
        payer: &AccountId,
        value: Decimal,
        op: &str,
        call: impl FnOnce(&mut R) -> Result<()>,
    ) -> Result<()> {
        custody.transfer(payer, &self.vault, value)?;
        if let Err(err) = call(&mut self.registry) {
            tracing::warn!(payer = %payer, %value, op, error = %err, "registry call failed; refunding");
            if let Err(refund) = custody.transfer(&self.vault, payer, value) {
                tracing::error!(payer = %payer, %value, error = %refund, "refund failed");
            }
            return Err(registry_failure(op, err));
        }
        Ok(())
    }

    /// New index after folding in rewards that reached the pool address.
    fn accrue<C: Custody>(&self, custody: &C) -> Result<Accrual> {
        let balance = custody.balance_of(&self.address);
        let reward = (balance - self.shot.balance).max(Decimal::ZERO);
        let mut accrual = Accrual {
            acc: self.acc_reward_per_vote,
            reward,
            unallocated: Decimal::ZERO,
            section: None,
        };
        if reward.is_zero() {
            return Ok(accrual);
        }
        if self.shot.available == 0 {
            accrual.unallocated = reward;
            return Ok(accrual);
        }
        let per_vote = value::mul_div(reward, Decimal::ONE, Decimal::from(self.shot.available))?;
        accrual.acc = value::checked_add(self.acc_reward_per_vote, per_vote, "acc_reward_per_vote")?;
        accrual.section = Some(RewardSection {
            start_block: self.shot.block,
            end_block: self.block,
            available: self.shot.available,
            reward,
        });
        Ok(accrual)
    }

    /// Split the user's reward since their last shot against index `acc`.
    fn settle(&self, user: &AccountId, acc: Decimal) -> Result<Settlement> {
        let Some(state) = self.users.get(user) else {
            return Ok(Settlement::default());
        };
        let delta = acc - state.shot.acc_reward_per_vote;
        if delta <= Decimal::ZERO || state.shot.available == 0 {
            return Ok(Settlement::default());
        }
        let pending = value::mul_div(delta, Decimal::from(state.shot.available), Decimal::ONE)?;
        let user_part = value::apply_ratio(pending, self.user_share_ratio(user), RATIO_BASE)?;
        Ok(Settlement {
            user_part,
            operator_part: pending - user_part,
        })
    }

    fn commit_accrual(&mut self, accrual: Accrual) {
        if accrual.reward > Decimal::ZERO {
            tracing::debug!(
                reward = %accrual.reward,
                acc = %accrual.acc,
                "pool reward accrued"
            );
        }
        self.acc_reward_per_vote = accrual.acc;
        self.summary.interest += accrual.unallocated;
        self.summary.total_interest += accrual.reward;
        if let Some(section) = accrual.section {
            self.apy.record(section);
        }
        self.apy.prune(self.block);
    }

    /// Fold matured queue entries into the stored counters.
    fn collect_matured(&mut self, user: &AccountId) {
        let now = self.block;
        self.summary.locked += self.in_queue.collect_matured(now);
        self.summary.unlocked += self.out_queue.collect_matured(now);
        if let Some(state) = self.users.get_mut(user) {
            state.summary.locked += state.in_queue.collect_matured(now);
            state.summary.unlocked += state.out_queue.collect_matured(now);
        }
    }

    fn commit_stake<C: Custody>(
        &mut self,
        custody: &C,
        user: AccountId,
        votes: u64,
        accrual: Accrual,
        settlement: Settlement,
    ) {
        self.commit_accrual(accrual);
        self.collect_matured(&user);
        let ready_at = self.block.saturating_add(self.config.lock_period);
        let state = self.users.entry(user).or_default();
        apply_settlement(state, &mut self.summary, settlement);
        state.summary.votes += votes;
        state.summary.available += votes;
        state.in_queue.enqueue(QueueEntry { votes, ready_at });
        self.summary.votes += votes;
        self.summary.available += votes;
        self.in_queue.enqueue(QueueEntry { votes, ready_at });
        self.stakers.insert(user);

        self.take_user_shot(&user);
        self.take_pool_shot(custody);
    }

    fn take_user_shot(&mut self, user: &AccountId) {
        let (acc, block) = (self.acc_reward_per_vote, self.block);
        if let Some(state) = self.users.get_mut(user) {
            state.shot = UserShot {
                available: state.summary.available,
                acc_reward_per_vote: acc,
                block,
            };
        }
    }

    fn take_pool_shot<C: Custody>(&mut self, custody: &C) {
        self.shot = PoolShot {
            available: self.summary.available,
            acc_reward_per_vote: self.acc_reward_per_vote,
            block: self.block,
            balance: custody.balance_of(&self.address),
        };
    }

    fn emit(&mut self, operation: Operation, actor: AccountId, amounts: EventFields) {
        let summary = self.pool_summary();
        self.journal.record(
            operation,
            actor,
            amounts,
            fields([
                ("votes", summary.votes.into()),
                ("available", summary.available.into()),
                ("locked", summary.locked.into()),
                ("unlocked", summary.unlocked.into()),
                ("interest", summary.interest),
                ("total_interest", summary.total_interest),
            ]),
        );
    }
}

fn apply_settlement(state: &mut UserState, pool: &mut PoolSummary, settlement: Settlement) {
    state.summary.interest += settlement.user_part;
    pool.interest += settlement.operator_part;
}

/// Normalise any registry error to `RegistryCallFailed`.
fn registry_failure(op: &str, err: StakeflowError) -> StakeflowError {
    match err {
        StakeflowError::RegistryCallFailed { .. } => err,
        other => StakeflowError::RegistryCallFailed {
            reason: format!("{op}: {other}"),
        },
    }
}
