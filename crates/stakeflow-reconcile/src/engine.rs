//! The assembled settlement engine: both ledgers, the external adapters
//! and the controller wired as bridge of both ledgers.

use rust_decimal::Decimal;
use stakeflow_claim::ClaimLedger;
use stakeflow_pool::PoolLedger;
use stakeflow_types::{AccountId, Custody, EngineConfig, Result, StakeRegistry, VoteEscrow};

use crate::controller::{Controller, Ledgers};
use crate::report::TickReport;

pub struct Engine<R: StakeRegistry, E: VoteEscrow, C: Custody> {
    pub pool: PoolLedger<R>,
    pub claim: ClaimLedger,
    pub escrow: E,
    pub custody: C,
    controller: Controller,
}

impl<R: StakeRegistry, E: VoteEscrow, C: Custody> Engine<R, E, C> {
    /// Build both ledgers owned by `owner` and install the controller as
    /// their bridge. Claim deposits are forwarded to the controller's
    /// mapped address.
    ///
    /// # Errors
    /// `Configuration` if `config` fails validation.
    pub fn new(
        owner: AccountId,
        config: EngineConfig,
        registry: R,
        escrow: E,
        custody: C,
    ) -> Result<Self> {
        config.validate()?;
        let controller = Controller::new(owner, config.controller)?;
        let mut pool = PoolLedger::new(owner, registry, config.pool)?;
        pool.set_bridge(owner, controller.account())?;
        let mut claim = ClaimLedger::new(owner, controller.mapped(), config.claim)?;
        claim.set_bridge(owner, controller.account())?;

        tracing::info!(
            owner = %owner,
            controller = %controller.account(),
            pool = %pool.address(),
            claim = %claim.address(),
            "engine assembled"
        );
        Ok(Self {
            pool,
            claim,
            escrow,
            custody,
            controller,
        })
    }

    /// Run one reconciliation tick.
    pub fn tick(&mut self) -> TickReport {
        let ledgers = Ledgers {
            pool: &mut self.pool,
            claim: &mut self.claim,
            escrow: &self.escrow,
            custody: &mut self.custody,
        };
        self.controller.tick(ledgers)
    }

    /// # Errors
    /// As [`Controller::withdraw_reserved_interest`].
    pub fn withdraw_reserved_interest(&mut self, caller: AccountId, amount: Decimal) -> Result<()> {
        self.controller
            .withdraw_reserved_interest(&mut self.custody, caller, amount)
    }

    /// # Errors
    /// As [`Controller::settle_first_redemption`].
    pub fn settle_first_redemption(&mut self, caller: AccountId) -> Result<Option<Decimal>> {
        self.controller
            .settle_first_redemption(&mut self.claim, &mut self.custody, caller)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    /// Advance the pool's block clock.
    pub fn advance_blocks(&mut self, blocks: u64) {
        self.pool.advance_blocks(blocks);
    }
}
