//! Tick reports: what a reconciliation tick did and what failed.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stakeflow_types::{BlockNumber, ErrorClass, Round, StakeflowError};

/// The independent steps of a tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    PullCustody,
    ClaimInterest,
    SettleRedemptions,
    StakeSurplus,
    LockRelay,
    VoteRelay,
    RegistryAudit,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PullCustody => write!(f, "PULL_CUSTODY"),
            Self::ClaimInterest => write!(f, "CLAIM_INTEREST"),
            Self::SettleRedemptions => write!(f, "SETTLE_REDEMPTIONS"),
            Self::StakeSurplus => write!(f, "STAKE_SURPLUS"),
            Self::LockRelay => write!(f, "LOCK_RELAY"),
            Self::VoteRelay => write!(f, "VOTE_RELAY"),
            Self::RegistryAudit => write!(f, "REGISTRY_AUDIT"),
        }
    }
}

/// A corrective call the controller applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    PulledCustody { amount: Decimal },
    ClaimedInterest { amount: Decimal, reserved: Decimal, added: Decimal },
    WithdrewVotes { votes: u64 },
    Unstaked { votes: u64 },
    SettledRedemptions { entries: usize, amount: Decimal },
    Staked { votes: u64 },
    LockRelayed { amount: Decimal, unlock_block: BlockNumber },
    VoteRelayed { round: Round, topics: usize },
}

/// A step that failed; the tick carried on with the next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: Step,
    pub class: ErrorClass,
    /// `SF_ERR_` code.
    pub code: String,
    pub message: String,
}

impl StepFailure {
    #[must_use]
    pub fn new(step: Step, err: &StakeflowError) -> Self {
        Self {
            step,
            class: err.class(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one reconciliation tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// 1-based tick counter.
    pub tick: u64,
    pub block: BlockNumber,
    pub actions: Vec<Action>,
    pub failures: Vec<StepFailure>,
    pub started_at: DateTime<Utc>,
}

impl TickReport {
    #[must_use]
    pub fn new(tick: u64, block: BlockNumber) -> Self {
        Self {
            tick,
            block,
            actions: Vec::new(),
            failures: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// True when the tick applied no corrective action.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }

    #[must_use]
    pub fn failed(&self, step: Step) -> bool {
        self.failures.iter().any(|f| f.step == step)
    }

    #[must_use]
    pub fn failure(&self, step: Step) -> Option<&StepFailure> {
        self.failures.iter().find(|f| f.step == step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_captures_code_and_class() {
        let err = StakeflowError::RegistryMismatch {
            pool_votes: 3,
            registry_votes: 2,
        };
        let failure = StepFailure::new(Step::RegistryAudit, &err);
        assert_eq!(failure.code, "SF_ERR_403");
        assert_eq!(failure.class, ErrorClass::Consistency);
        assert!(failure.message.contains("3 votes"));
    }

    #[test]
    fn empty_report_is_noop() {
        let mut report = TickReport::new(1, 0);
        assert!(report.is_noop());
        report.actions.push(Action::Staked { votes: 1 });
        assert!(!report.is_noop());
        assert!(!report.failed(Step::StakeSurplus));
    }

    #[test]
    fn report_json_keeps_amounts_as_strings() {
        let mut report = TickReport::new(3, 42);
        report.actions.push(Action::PulledCustody {
            amount: Decimal::new(25, 1),
        });
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains(r#""amount":"2.5""#));
        let back: TickReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn step_display() {
        assert_eq!(format!("{}", Step::SettleRedemptions), "SETTLE_REDEMPTIONS");
    }
}
