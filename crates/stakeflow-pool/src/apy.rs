//! Pool APY and period reward rate.
//!
//! Both figures are analytics only. Nothing in settlement reads them, and
//! their rounding never feeds back into the ledger.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stakeflow_types::{
    BlockNumber, Result, StakeRegistry, StakeflowError,
    constants::{
        APR_PERIOD_COUNT, APY_WINDOW_BLOCKS, BRIDGE_RATIO_BASE, ONE_YEAR_BLOCK_COUNT, RATIO_BASE,
    },
    value,
};

/// Reward received over a block range while `available` votes were staked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSection {
    pub start_block: BlockNumber,
    pub end_block: BlockNumber,
    pub available: u64,
    pub reward: Decimal,
}

impl RewardSection {
    /// Staked value multiplied by blocks elapsed.
    fn workload(&self) -> Decimal {
        value::votes_to_value(self.available)
            * Decimal::from(self.end_block.saturating_sub(self.start_block))
    }
}

/// Rolling window of reward sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApyTracker {
    sections: VecDeque<RewardSection>,
}

impl ApyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, section: RewardSection) {
        self.sections.push_back(section);
    }

    /// Drop sections that ended before the window starting at `now - 7 days`.
    pub fn prune(&mut self, now: BlockNumber) {
        let cutoff = now.saturating_sub(APY_WINDOW_BLOCKS);
        while self
            .sections
            .front()
            .is_some_and(|s| s.end_block < cutoff)
        {
            self.sections.pop_front();
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Annualised yield in `RATIO_BASE` units over the window, including a
    /// `pending` section not yet recorded.
    pub fn apy(&self, now: BlockNumber, pending: Option<RewardSection>) -> Result<Decimal> {
        let cutoff = now.saturating_sub(APY_WINDOW_BLOCKS);
        let mut reward = Decimal::ZERO;
        let mut workload = Decimal::ZERO;
        for section in self
            .sections
            .iter()
            .filter(|s| s.end_block >= cutoff)
            .chain(pending.iter())
        {
            reward = value::checked_add(reward, section.reward, "apy reward")?;
            workload = value::checked_add(workload, section.workload(), "apy workload")?;
        }
        if workload.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let scaled = reward
            .checked_mul(Decimal::from(RATIO_BASE))
            .ok_or_else(|| StakeflowError::ArithmeticOverflow {
                context: "apy scale".into(),
            })?;
        value::mul_div(scaled, Decimal::from(ONE_YEAR_BLOCK_COUNT), workload)
    }
}

/// Reward per staked value over the `APR_PERIOD_COUNT` epochs before
/// `epoch`, in `BRIDGE_RATIO_BASE` units.
///
/// Zero when `epoch` is below the period count or no votes were recorded.
pub fn period_reward_rate(registry: &impl StakeRegistry, epoch: u64) -> Result<Decimal> {
    if epoch < APR_PERIOD_COUNT {
        return Ok(Decimal::ZERO);
    }
    let mut reward = Decimal::ZERO;
    let mut votes: u64 = 0;
    for e in (epoch - APR_PERIOD_COUNT)..epoch {
        let record = registry.rewards_by_epoch(e)?;
        reward = value::checked_add(reward, record.reward, "period reward")?;
        votes = votes.saturating_add(record.votes);
    }
    if votes == 0 {
        return Ok(Decimal::ZERO);
    }
    value::mul_div(
        reward,
        Decimal::from(BRIDGE_RATIO_BASE),
        value::votes_to_value(votes),
    )
}
