//! Claim Token Ledger.
//!
//! A fungible claim token whose value floats with the assets behind it:
//!
//! ```text
//!   exchange rate = total_deposited / total_supply      (1 at genesis)
//!   deposit:  tokens = value * supply / deposited
//!   redeem:   value  = tokens * deposited / supply
//! ```
//!
//! Redeemed value leaves `total_deposited` immediately and waits in the
//! FIFO redeem queue as `total_claimed` until the bridge settles it with
//! [`ClaimLedger::handle_redeem`]. Settled value becomes withdrawable.

use std::collections::HashMap;

use rust_decimal::Decimal;
use stakeflow_types::{
    AccountId, ClaimConfig, Custody, EventFields, EventJournal, LedgerKind, Operation,
    RedeemEntry, Result, StakeflowError, StakerSet,
    constants::BRIDGE_RATIO_BASE,
    fields, value,
};

use crate::redeem_queue::RedeemQueue;

/// The claim token ledger.
pub struct ClaimLedger {
    config: ClaimConfig,
    owner: AccountId,
    bridge: Option<AccountId>,
    /// Custody account holding settled redemptions until withdrawn.
    address: AccountId,
    /// Bridge-mapped custody account deposits are forwarded to.
    forward_to: AccountId,

    balances: HashMap<AccountId, Decimal>,
    total_supply: Decimal,
    total_deposited: Decimal,
    total_claimed: Decimal,

    queue: RedeemQueue,
    withdrawable: HashMap<AccountId, Decimal>,
    user_claimed: HashMap<AccountId, Decimal>,
    stakers: StakerSet,
    journal: EventJournal,
}

impl ClaimLedger {
    /// Create a ledger forwarding deposits to `forward_to`.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(owner: AccountId, forward_to: AccountId, config: ClaimConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            owner,
            bridge: None,
            address: AccountId::new(),
            forward_to,
            balances: HashMap::new(),
            total_supply: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_claimed: Decimal::ZERO,
            queue: RedeemQueue::new(),
            withdrawable: HashMap::new(),
            user_claimed: HashMap::new(),
            stakers: StakerSet::new(),
            journal: EventJournal::new(LedgerKind::Claim),
        })
    }

    // =================================================================
    // User operations
    // =================================================================

    /// Deposit `value` and mint tokens at the current rate.
    ///
    /// # Errors
    /// - `ZeroAmount` for zero value or value that mints no tokens
    /// - `InsufficientDeposited` while tokens exist with no assets behind them
    /// - custody errors if the user cannot pay
    pub fn deposit<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
        value: Decimal,
    ) -> Result<Decimal> {
        if value <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let tokens = self.preview_deposit(value)?;
        if tokens <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        custody.transfer(&user, &self.forward_to, value)?;

        *self.balances.entry(user).or_default() += tokens;
        self.total_supply += tokens;
        self.total_deposited += value;
        self.stakers.insert(user);

        self.emit(
            Operation::Deposit,
            user,
            fields([("value", value), ("tokens", tokens)]),
        );
        Ok(tokens)
    }

    /// Burn `tokens` and queue their value for settlement.
    ///
    /// # Errors
    /// - `ZeroAmount` for zero tokens or tokens worth nothing
    /// - `InsufficientBalance` if the user holds fewer tokens
    pub fn redeem(&mut self, user: AccountId, tokens: Decimal) -> Result<Decimal> {
        if tokens <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let balance = self.balance_of(&user);
        if balance < tokens {
            return Err(StakeflowError::InsufficientBalance {
                needed: tokens,
                available: balance,
            });
        }
        let value = self.preview_redeem(tokens)?;
        if value <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }

        self.debit_tokens(&user, tokens);
        self.total_supply -= tokens;
        self.total_deposited -= value;
        self.total_claimed += value;
        *self.user_claimed.entry(user).or_default() += value;
        self.queue.push(RedeemEntry {
            user,
            amount: value,
        });

        self.emit(
            Operation::Redeem,
            user,
            fields([("tokens", tokens), ("value", value)]),
        );
        Ok(value)
    }

    /// Pay out `amount` of the user's settled redemptions.
    ///
    /// # Errors
    /// - `ZeroAmount`
    /// - `InsufficientWithdrawable` if `amount` exceeds what was settled
    /// - `InsufficientContractBalance` if the ledger's custody is short
    pub fn withdraw<C: Custody>(
        &mut self,
        custody: &mut C,
        user: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let available = self.user_withdrawable(&user);
        if amount > available {
            return Err(StakeflowError::InsufficientWithdrawable {
                needed: amount,
                available,
            });
        }
        let held = custody.balance_of(&self.address);
        if held < amount {
            return Err(StakeflowError::InsufficientContractBalance {
                needed: amount,
                available: held,
            });
        }
        custody.transfer(&self.address, &user, amount)?;

        if let Some(entry) = self.withdrawable.get_mut(&user) {
            *entry -= amount;
            if entry.is_zero() {
                self.withdrawable.remove(&user);
            }
        }
        self.emit(Operation::Withdraw, user, fields([("amount", amount)]));
        Ok(())
    }

    /// Move tokens between holders.
    ///
    /// # Errors
    /// `ZeroAmount`, `InsufficientBalance`.
    pub fn transfer(&mut self, from: AccountId, to: AccountId, tokens: Decimal) -> Result<()> {
        if tokens <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        let balance = self.balance_of(&from);
        if balance < tokens {
            return Err(StakeflowError::InsufficientBalance {
                needed: tokens,
                available: balance,
            });
        }
        self.debit_tokens(&from, tokens);
        *self.balances.entry(to).or_default() += tokens;
        self.stakers.insert(to);
        self.emit(Operation::Transfer, from, fields([("tokens", tokens)]));
        Ok(())
    }

    // =================================================================
    // Bridge operations
    // =================================================================

    /// Settle a whole-entry prefix of the redeem queue worth exactly
    /// `supplied`, moving that value from the bridge into this ledger.
    ///
    /// Nothing is mutated unless every check passes. Returns the number of
    /// entries consumed.
    ///
    /// # Errors
    /// - `NotBridge`
    /// - `RedeemQueueEmpty`
    /// - `RedeemAmountNotMatch` unless `supplied` equals a head prefix sum
    /// - `RedeemAmountAbnormal` if `supplied` exceeds `total_claimed`
    /// - custody errors if the bridge cannot pay
    pub fn handle_redeem<C: Custody>(
        &mut self,
        custody: &mut C,
        caller: AccountId,
        supplied: Decimal,
    ) -> Result<usize> {
        self.ensure_bridge(&caller)?;
        if self.queue.is_empty() {
            return Err(StakeflowError::RedeemQueueEmpty);
        }
        let (count, matched) = self.queue.prefix_within(supplied);
        if count == 0 || matched != supplied {
            return Err(StakeflowError::RedeemAmountNotMatch { supplied, matched });
        }
        if supplied > self.total_claimed {
            return Err(StakeflowError::RedeemAmountAbnormal {
                supplied,
                total_claimed: self.total_claimed,
            });
        }
        custody.transfer(&caller, &self.address, supplied)?;

        for _ in 0..count {
            if let Some(entry) = self.queue.pop_front() {
                *self.withdrawable.entry(entry.user).or_default() += entry.amount;
            }
        }
        self.total_claimed -= matched;

        tracing::debug!(entries = count, %matched, remaining = self.queue.len(), "redemptions settled");
        self.emit(
            Operation::HandleRedeem,
            caller,
            fields([("supplied", supplied), ("entries", count.into())]),
        );
        Ok(count)
    }

    /// Credit staking rewards to the assets behind the token.
    ///
    /// # Errors
    /// `NotBridge`, `ZeroAmount`.
    pub fn add_assets(&mut self, caller: AccountId, value: Decimal) -> Result<()> {
        self.ensure_bridge(&caller)?;
        if value <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        self.total_deposited += value;
        self.emit(Operation::AddAssets, caller, fields([("value", value)]));
        Ok(())
    }

    /// Debit penalties from the assets behind the token.
    ///
    /// # Errors
    /// `NotBridge`, `ZeroAmount`, `InsufficientDeposited`.
    pub fn deduct_assets(&mut self, caller: AccountId, value: Decimal) -> Result<()> {
        self.ensure_bridge(&caller)?;
        if value <= Decimal::ZERO {
            return Err(StakeflowError::ZeroAmount);
        }
        if value > self.total_deposited {
            return Err(StakeflowError::InsufficientDeposited {
                needed: value,
                available: self.total_deposited,
            });
        }
        self.total_deposited -= value;
        self.emit(Operation::DeductAssets, caller, fields([("value", value)]));
        Ok(())
    }

    /// # Errors
    /// `NotOwner`.
    pub fn set_bridge(&mut self, caller: AccountId, bridge: AccountId) -> Result<()> {
        if caller != self.owner {
            return Err(StakeflowError::NotOwner { caller });
        }
        self.bridge = Some(bridge);
        tracing::info!(bridge = %bridge, "claim ledger bridge set");
        self.emit(Operation::SetBridge, caller, EventFields::new());
        Ok(())
    }

    // =================================================================
    // Views
    // =================================================================

    /// Tokens `value` would mint now.
    ///
    /// # Errors
    /// `InsufficientDeposited` if supply exists with no deposited assets.
    pub fn preview_deposit(&self, value: Decimal) -> Result<Decimal> {
        if self.total_supply.is_zero() {
            return Ok(value);
        }
        if self.total_deposited.is_zero() {
            return Err(StakeflowError::InsufficientDeposited {
                needed: value,
                available: Decimal::ZERO,
            });
        }
        value::mul_div(value, self.total_supply, self.total_deposited)
    }

    /// Value `tokens` would redeem for now.
    ///
    /// # Errors
    /// `ArithmeticOverflow` only.
    pub fn preview_redeem(&self, tokens: Decimal) -> Result<Decimal> {
        if self.total_supply.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let value = value::mul_div(tokens, self.total_deposited, self.total_supply)?;
        Ok(value.min(self.total_deposited))
    }

    /// Deposited value per token; 1 while nothing is minted.
    ///
    /// # Errors
    /// `ArithmeticOverflow` only.
    pub fn exchange_rate(&self) -> Result<Decimal> {
        if self.total_supply.is_zero() {
            return Ok(Decimal::ONE);
        }
        value::mul_div(self.total_deposited, Decimal::ONE, self.total_supply)
    }

    /// Deposited per supply in `BRIDGE_RATIO_BASE` units.
    ///
    /// # Errors
    /// `ArithmeticOverflow` only.
    pub fn ratio_deposited_by_supply(&self) -> Result<Decimal> {
        if self.total_supply.is_zero() {
            return Ok(Decimal::from(BRIDGE_RATIO_BASE));
        }
        value::mul_div(
            self.total_deposited,
            Decimal::from(BRIDGE_RATIO_BASE),
            self.total_supply,
        )
    }

    #[must_use]
    pub fn balance_of(&self, user: &AccountId) -> Decimal {
        self.balances.get(user).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    #[must_use]
    pub fn total_deposited(&self) -> Decimal {
        self.total_deposited
    }

    /// Value redeemed but not yet settled.
    #[must_use]
    pub fn total_claimed(&self) -> Decimal {
        self.total_claimed
    }

    /// Lifetime value the user has redeemed.
    #[must_use]
    pub fn user_claimed(&self, user: &AccountId) -> Decimal {
        self.user_claimed.get(user).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn user_withdrawable(&self, user: &AccountId) -> Decimal {
        self.withdrawable.get(user).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn redeem_queue(&self, offset: usize, limit: usize) -> Vec<RedeemEntry> {
        self.queue.page(offset, limit)
    }

    /// Amount of the head entry, zero when the queue is empty.
    #[must_use]
    pub fn first_redeem_amount(&self) -> Decimal {
        self.queue.front().map_or(Decimal::ZERO, |e| e.amount)
    }

    #[must_use]
    pub fn redeem_len(&self) -> usize {
        self.queue.len()
    }

    /// Sum of the first `count` entries, fewer if the queue is shorter.
    #[must_use]
    pub fn redeem_prefix_sum(&self, count: usize) -> Decimal {
        self.queue.iter().take(count).map(|e| e.amount).sum()
    }

    #[must_use]
    pub fn staker_number(&self) -> usize {
        self.stakers.len()
    }

    #[must_use]
    pub fn staker_address(&self, index: usize) -> Option<AccountId> {
        self.stakers.get(index)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    #[must_use]
    pub fn owner(&self) -> AccountId {
        self.owner
    }

    #[must_use]
    pub fn bridge(&self) -> Option<AccountId> {
        self.bridge
    }

    /// Custody account holding settled redemptions.
    #[must_use]
    pub fn address(&self) -> AccountId {
        self.address
    }

    #[must_use]
    pub fn forward_to(&self) -> AccountId {
        self.forward_to
    }

    #[must_use]
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    // =================================================================
    // Internals
    // =================================================================

    fn ensure_bridge(&self, caller: &AccountId) -> Result<()> {
        if self.bridge != Some(*caller) {
            return Err(StakeflowError::NotBridge { caller: *caller });
        }
        Ok(())
    }

    /// Caller has checked the balance covers `tokens`.
    fn debit_tokens(&mut self, user: &AccountId, tokens: Decimal) {
        if let Some(balance) = self.balances.get_mut(user) {
            *balance -= tokens;
            if balance.is_zero() {
                self.balances.remove(user);
                self.stakers.remove(user);
            }
        }
    }

    fn emit(&mut self, operation: Operation, actor: AccountId, amounts: EventFields) {
        let summary = fields([
            ("total_supply", self.total_supply),
            ("total_deposited", self.total_deposited),
            ("total_claimed", self.total_claimed),
            ("redeem_len", self.queue.len().into()),
        ]);
        self.journal.record(operation, actor, amounts, summary);
    }
}
