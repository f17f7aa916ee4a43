//! The Reconciliation Controller.
//!
//! Each tick runs these steps in order, each re-deriving its precondition
//! from current ledger state:
//!
//! ```text
//!  pull custody ─▶ claim interest ─▶ settle redemptions ─▶ stake surplus
//!        ─▶ lock relay ─▶ vote relay ─▶ registry audit
//! ```
//!
//! A failing step is recorded in the [`TickReport`] and the tick moves on.
//! Writes happen strictly one call at a time since later steps read the
//! effects of earlier ones.

use rust_decimal::Decimal;
use stakeflow_claim::ClaimLedger;
use stakeflow_pool::PoolLedger;
use stakeflow_types::{
    AccountId, ControllerConfig, Custody, EventJournal, LedgerKind, Operation, Result,
    StakeRegistry, StakeflowError, TopicVotes, VoteEscrow,
    constants::{BRIDGE_RATIO_BASE, VOTE_TOPIC_COUNT},
    fields, value,
};

use crate::report::{Action, Step, StepFailure, TickReport};
use crate::state::{LockParams, ReconciliationState};

/// Mutable views of everything a tick touches.
pub struct Ledgers<'a, R: StakeRegistry, E: VoteEscrow, C: Custody> {
    pub pool: &'a mut PoolLedger<R>,
    pub claim: &'a mut ClaimLedger,
    pub escrow: &'a E,
    pub custody: &'a mut C,
}

pub struct Controller {
    config: ControllerConfig,
    owner: AccountId,
    /// Pool staker account and bridge of both ledgers.
    account: AccountId,
    /// Custody address cross-domain transfers (claim deposits) land in.
    mapped: AccountId,
    /// Operator share of claimed interest, held in `account`.
    reserved_interest: Decimal,
    state: ReconciliationState,
    ticks: u64,
    journal: EventJournal,
}

impl Controller {
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(owner: AccountId, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            owner,
            account: AccountId::new(),
            mapped: AccountId::new(),
            reserved_interest: Decimal::ZERO,
            state: ReconciliationState::new(),
            ticks: 0,
            journal: EventJournal::new(LedgerKind::Controller),
        })
    }

    /// Run one reconciliation tick.
    pub fn tick<R, E, C>(&mut self, mut l: Ledgers<'_, R, E, C>) -> TickReport
    where
        R: StakeRegistry,
        E: VoteEscrow,
        C: Custody,
    {
        self.ticks += 1;
        let mut report = TickReport::new(self.ticks, l.pool.block());

        let outcome = self.pull_custody(&mut l, &mut report.actions);
        record(&mut report, Step::PullCustody, outcome);
        let outcome = self.claim_interest(&mut l, &mut report.actions);
        record(&mut report, Step::ClaimInterest, outcome);
        let outcome = self.settle_redemptions(&mut l, &mut report.actions);
        record(&mut report, Step::SettleRedemptions, outcome);
        let outcome = self.stake_surplus(&mut l, &mut report.actions);
        record(&mut report, Step::StakeSurplus, outcome);
        let outcome = self.relay_lock(&mut l, &mut report.actions);
        record(&mut report, Step::LockRelay, outcome);
        let outcome = self.relay_votes(&mut l, &mut report.actions);
        record(&mut report, Step::VoteRelay, outcome);
        let outcome = Self::audit_registry(&l);
        record(&mut report, Step::RegistryAudit, outcome);

        tracing::info!(
            tick = report.tick,
            block = report.block,
            actions = report.actions.len(),
            failures = report.failures.len(),
            "reconciliation tick complete"
        );
        report
    }

    // =================================================================
    // Settlement steps
    // =================================================================

    /// Step 1: move value from the mapped address into the controller.
    fn pull_custody<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        let amount = l.custody.balance_of(&self.mapped);
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        l.custody.transfer(&self.mapped, &self.account, amount)?;
        self.journal.record(
            Operation::PullCustody,
            self.account,
            fields([("amount", amount)]),
            fields([("reserved_interest", self.reserved_interest)]),
        );
        actions.push(Action::PulledCustody { amount });
        Ok(())
    }

    /// Step 2: claim pool interest, reserve the operator share and credit
    /// the rest to the claim token's assets.
    fn claim_interest<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        let claimable = l.pool.user_interest(&*l.custody, &self.account)?;
        if claimable <= Decimal::ZERO {
            return Ok(());
        }
        let amount = l.pool.claim_all_interest(l.custody, self.account)?;
        let reserved = value::apply_ratio(amount, self.config.pool_share_ratio, BRIDGE_RATIO_BASE)?;
        let added = amount - reserved;
        self.reserved_interest = value::checked_add(self.reserved_interest, reserved, "reserved interest")?;
        if added > Decimal::ZERO {
            l.claim.add_assets(self.account, added)?;
        }
        actions.push(Action::ClaimedInterest {
            amount,
            reserved,
            added,
        });
        Ok(())
    }

    /// Step 3: make sure redemptions can be paid, then pay them.
    fn settle_redemptions<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        let unlocked = l.pool.user_summary(&self.account).unlocked;
        if unlocked > 0 {
            l.pool.withdraw_stake(l.custody, self.account, unlocked)?;
            actions.push(Action::WithdrewVotes { votes: unlocked });
        }

        let mine = l.pool.user_summary(&self.account);
        let balance = l.custody.balance_of(&self.account);
        let coverage = balance + value::votes_to_value(mine.unlocking());
        let queue_pending = l.claim.redeem_len() > 0;
        let owed = if queue_pending {
            l.claim.total_claimed()
        } else {
            self.reserved_interest
        };

        if coverage < owed && mine.locked > 0 {
            let needed = value::value_to_votes_ceil(owed - coverage);
            let votes = needed.min(mine.locked);
            l.pool.unstake(&*l.custody, self.account, votes)?;
            actions.push(Action::Unstaked { votes });
            if votes < needed {
                return Err(StakeflowError::InsufficientVotes {
                    needed,
                    available: votes,
                });
            }
        }

        if queue_pending && balance >= l.claim.total_claimed() {
            while l.claim.redeem_len() > 0 {
                let count = l.claim.redeem_len().min(self.config.max_redeem_per_call);
                let amount = l.claim.redeem_prefix_sum(count);
                let entries = l.claim.handle_redeem(l.custody, self.account, amount)?;
                actions.push(Action::SettledRedemptions { entries, amount });
            }
        }
        Ok(())
    }

    /// Step 4: stake idle value in whole votes.
    fn stake_surplus<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        if !l.pool.is_registered() {
            tracing::debug!("pool not registered; surplus left idle");
            return Ok(());
        }
        let balance = l.custody.balance_of(&self.account);
        let committed = self.reserved_interest + l.claim.total_claimed();
        let stakeable = (balance - committed).max(Decimal::ZERO);
        if stakeable <= value::votes_to_value(1) {
            return Ok(());
        }
        let votes = value::value_to_votes_floor(stakeable);
        l.pool
            .stake(l.custody, self.account, votes, value::votes_to_value(votes))?;
        actions.push(Action::Staked { votes });
        Ok(())
    }

    // =================================================================
    // Governance relay
    // =================================================================

    fn relay_lock<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        let block = l.pool.block();
        let unlock_block = l.escrow.last_unlock_block()?;
        if unlock_block < block {
            return Ok(());
        }
        let params = LockParams {
            amount: l.escrow.global_lock_amount(block)?,
            unlock_block,
        };
        if !self.state.lock_changed(params) {
            return Ok(());
        }
        l.pool
            .lock_for_vote_power(self.account, params.amount, params.unlock_block)?;
        self.state.remember_lock(params);
        actions.push(Action::LockRelayed {
            amount: params.amount,
            unlock_block,
        });
        Ok(())
    }

    fn relay_votes<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        &mut self,
        l: &mut Ledgers<'_, R, E, C>,
        actions: &mut Vec<Action>,
    ) -> Result<()> {
        let round = l.escrow.current_round()?;
        let tallies = (0..VOTE_TOPIC_COUNT)
            .map(|topic| {
                l.escrow
                    .pool_vote_info(round, topic)
                    .map(|votes| TopicVotes { topic, votes })
            })
            .collect::<Result<Vec<_>>>()?;
        if !self.state.votes_changed(round, &tallies) {
            return Ok(());
        }
        l.pool.cast_vote(self.account, round, &tallies)?;
        let topics = tallies.len();
        self.state.remember_votes(round, tallies);
        actions.push(Action::VoteRelayed { round, topics });
        Ok(())
    }

    // =================================================================
    // Audit
    // =================================================================

    /// Read-only comparison of pool votes with the registry's view.
    fn audit_registry<R: StakeRegistry, E: VoteEscrow, C: Custody>(
        l: &Ledgers<'_, R, E, C>,
    ) -> Result<()> {
        if !l.pool.is_registered() {
            return Ok(());
        }
        let identity = l.pool.pos_identity()?;
        let status = l.pool.registry().account_status(&identity)?;
        let pool_votes = l.pool.pool_summary().votes;
        let registry_votes = status.total_votes();
        if pool_votes != registry_votes {
            return Err(StakeflowError::RegistryMismatch {
                pool_votes,
                registry_votes,
            });
        }
        Ok(())
    }

    // =================================================================
    // Operator
    // =================================================================

    /// Pay `amount` of reserved interest to the owner.
    ///
    /// # Errors
    /// - `NotOwner`, `ZeroAmount`
    /// - `InsufficientPoolInterest` if `amount` exceeds the reserve
    /// - `InsufficientBalance` if the controller account cannot cover it
    pub fn withdraw_reserved_interest<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        if caller != self.owner {
            return Err(StakeflowError::NotOwner { caller });
        }
        if amount <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        if amount > self.reserved_interest {
            return Err(StakeflowError::InsufficientPoolInterest {
                needed: amount,
                available: self.reserved_interest,
            });
        }
        let balance = custody.balance_of(&self.account);
        if balance < amount {
            return Err(StakeflowError::InsufficientBalance {
                needed: amount,
                available: balance,
            });
        }
        custody.transfer(&self.account, &caller, amount)?;
        self.reserved_interest -= amount;
        self.journal.record(
            Operation::WithdrawReservedInterest,
            caller,
            fields([("amount", amount)]),
            fields([("reserved_interest", self.reserved_interest)]),
        );
        Ok(())
    }

    /// Settle only the head of the redeem queue if the controller's
    /// balance covers it. Returns the settled amount, or `None` when the
    /// queue is empty or the head is not yet covered.
    ///
    /// # Errors
    /// `NotOwner`, otherwise as [`ClaimLedger::handle_redeem`].
    pub fn settle_first_redemption<C: Custody>(
        &self,
        claim: &mut ClaimLedger,
        custody: &mut C,
        caller: AccountId,
    ) -> Result<Option<Decimal>> {
        if caller != self.owner {
            return Err(StakeflowError::NotOwner { caller });
        }
        if claim.redeem_len() == 0 {
            return Ok(None);
        }
        let amount = claim.first_redeem_amount();
        let balance = custody.balance_of(&self.account);
        if balance < amount {
            tracing::debug!(%amount, %balance, "first redemption not yet covered");
            return Ok(None);
        }
        claim.handle_redeem(custody, self.account, amount)?;
        tracing::info!(%amount, remaining = claim.redeem_len(), "first redemption settled");
        Ok(Some(amount))
    }

    // =================================================================
    // Views
    // =================================================================

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn mapped(&self) -> AccountId {
        self.mapped
    }

    pub fn owner(&self) -> AccountId {
        self.owner
    }

    pub fn reserved_interest(&self) -> Decimal {
        self.reserved_interest
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> &ReconciliationState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ReconciliationState {
        &mut self.state
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }
}

fn record(report: &mut TickReport, step: Step, outcome: Result<()>) {
    if let Err(err) = outcome {
        tracing::warn!(
            tick = report.tick,
            step = %step,
            class = %err.class(),
            error = %err,
            "reconciliation step failed"
        );
        report.failures.push(StepFailure::new(step, &err));
    }
}
