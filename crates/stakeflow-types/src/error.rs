//! Error types for the stakeflow settlement engine.
//!
//! All errors use the `SF_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Validation errors (bad arguments, bad configuration values)
//! - 2xx: Authorization errors (caller is not owner / bridge)
//! - 3xx: Insufficiency errors (balances, votes, interest)
//! - 4xx: Consistency errors (redeem settlement, registry drift)
//! - 5xx: Upstream errors (registry, custody, vote escrow)
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

/// Coarse classification of a [`StakeflowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    Validation,
    Authorization,
    Insufficiency,
    Consistency,
    Upstream,
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::Insufficiency => write!(f, "INSUFFICIENCY"),
            Self::Consistency => write!(f, "CONSISTENCY"),
            Self::Upstream => write!(f, "UPSTREAM"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Central error enum for all stakeflow operations.
#[derive(Debug, Error)]
pub enum StakeflowError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A zero amount was supplied where a positive one is required.
    #[error("SF_ERR_100: Amount must be greater than zero")]
    ZeroAmount,

    /// Vote power argument is out of range for the operation.
    #[error("SF_ERR_101: Invalid vote power: {votes}")]
    InvalidVotePower { votes: u64 },

    /// Attached value does not equal the value the operation requires.
    #[error("SF_ERR_102: Invalid value: expected {expected}, got {actual}")]
    InvalidValue { expected: Decimal, actual: Decimal },

    /// A ratio argument fell outside its permitted range.
    #[error("SF_ERR_103: Ratio {ratio} out of range (0, {base}]")]
    RatioOutOfRange { ratio: u64, base: u64 },

    /// The pool has not been registered with the stake registry yet.
    #[error("SF_ERR_104: Pool is not registered")]
    PoolNotRegistered,

    /// The pool is already registered.
    #[error("SF_ERR_105: Pool is already registered")]
    PoolAlreadyRegistered,

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// Caller is not the owner of the ledger.
    #[error("SF_ERR_200: Caller {caller} is not the owner")]
    NotOwner { caller: AccountId },

    /// Caller is not the configured bridge.
    #[error("SF_ERR_201: Caller {caller} is not the bridge")]
    NotBridge { caller: AccountId },

    // =================================================================
    // Insufficiency Errors (3xx)
    // =================================================================
    /// Unstake requested more votes than are locked.
    #[error("SF_ERR_300: Insufficient locked votes: need {needed}, have {locked}")]
    InsufficientLocked { needed: u64, locked: u64 },

    /// Withdraw requested more votes than are unlocked.
    #[error("SF_ERR_301: Insufficient unlocked votes: need {needed}, have {unlocked}")]
    InsufficientUnlocked { needed: u64, unlocked: u64 },

    /// Interest claim exceeds the user's accrued interest.
    #[error("SF_ERR_302: Interest not enough: need {needed}, have {available}")]
    InterestNotEnough { needed: Decimal, available: Decimal },

    /// The pool's custody balance cannot cover the payout.
    #[error("SF_ERR_303: Pool balance not enough: need {needed}, have {available}")]
    PoolBalanceNotEnough { needed: Decimal, available: Decimal },

    /// There is no interest to claim.
    #[error("SF_ERR_304: No claimable interest")]
    NoClaimableInterest,

    /// Token or custody balance is too low.
    #[error("SF_ERR_305: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Withdraw exceeds the user's withdrawable amount.
    #[error("SF_ERR_306: Insufficient withdrawable: need {needed}, have {available}")]
    InsufficientWithdrawable { needed: Decimal, available: Decimal },

    /// The claim ledger's own custody balance cannot cover a withdrawal.
    #[error("SF_ERR_307: Insufficient contract balance: need {needed}, have {available}")]
    InsufficientContractBalance { needed: Decimal, available: Decimal },

    /// Deduction exceeds the total deposited assets.
    #[error("SF_ERR_308: Insufficient deposited: need {needed}, have {available}")]
    InsufficientDeposited { needed: Decimal, available: Decimal },

    /// Operator interest withdrawal exceeds what has been reserved.
    #[error("SF_ERR_309: Insufficient pool interest: need {needed}, have {available}")]
    InsufficientPoolInterest { needed: Decimal, available: Decimal },

    /// Not enough locked votes to cover a required unstake.
    #[error("SF_ERR_310: Insufficient votes: need {needed}, have {available}")]
    InsufficientVotes { needed: u64, available: u64 },

    // =================================================================
    // Consistency Errors (4xx)
    // =================================================================
    /// Settlement was attempted against an empty redeem queue.
    #[error("SF_ERR_400: Redeem queue is empty")]
    RedeemQueueEmpty,

    /// Supplied value is not an exact whole-entry prefix of the queue.
    #[error("SF_ERR_401: Redeem amount not match: supplied {supplied}, matched {matched}")]
    RedeemAmountNotMatch { supplied: Decimal, matched: Decimal },

    /// Supplied value exceeds the total outstanding redemptions.
    #[error("SF_ERR_402: Redeem amount abnormal: supplied {supplied}, total claimed {total_claimed}")]
    RedeemAmountAbnormal {
        supplied: Decimal,
        total_claimed: Decimal,
    },

    /// Pool totals disagree with the stake registry.
    #[error("SF_ERR_403: Registry mismatch: pool {pool_votes} votes, registry {registry_votes} votes")]
    RegistryMismatch { pool_votes: u64, registry_votes: u64 },

    // =================================================================
    // Upstream Errors (5xx)
    // =================================================================
    /// A stake registry call failed.
    #[error("SF_ERR_500: Registry call failed: {reason}")]
    RegistryCallFailed { reason: String },

    /// A custody transfer failed.
    #[error("SF_ERR_501: Custody transfer failed: {reason}")]
    CustodyTransferFailed { reason: String },

    /// A vote escrow read failed.
    #[error("SF_ERR_502: Vote escrow call failed: {reason}")]
    EscrowCallFailed { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// A reconciliation tick is already running.
    #[error("SF_ERR_900: Tick skipped: previous tick still in flight")]
    TickSkipped,

    /// A checked arithmetic operation overflowed.
    #[error("SF_ERR_901: Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: String },

    /// Configuration error (invalid file, out-of-range fields).
    #[error("SF_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("SF_ERR_903: Serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable internal error.
    #[error("SF_ERR_999: Internal error: {0}")]
    Internal(String),
}

impl StakeflowError {
    /// The class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ZeroAmount
            | Self::InvalidVotePower { .. }
            | Self::InvalidValue { .. }
            | Self::RatioOutOfRange { .. }
            | Self::PoolNotRegistered
            | Self::PoolAlreadyRegistered => ErrorClass::Validation,
            Self::NotOwner { .. } | Self::NotBridge { .. } => ErrorClass::Authorization,
            Self::InsufficientLocked { .. }
            | Self::InsufficientUnlocked { .. }
            | Self::InterestNotEnough { .. }
            | Self::PoolBalanceNotEnough { .. }
            | Self::NoClaimableInterest
            | Self::InsufficientBalance { .. }
            | Self::InsufficientWithdrawable { .. }
            | Self::InsufficientContractBalance { .. }
            | Self::InsufficientDeposited { .. }
            | Self::InsufficientPoolInterest { .. }
            | Self::InsufficientVotes { .. } => ErrorClass::Insufficiency,
            Self::RedeemQueueEmpty
            | Self::RedeemAmountNotMatch { .. }
            | Self::RedeemAmountAbnormal { .. }
            | Self::RegistryMismatch { .. } => ErrorClass::Consistency,
            Self::RegistryCallFailed { .. }
            | Self::CustodyTransferFailed { .. }
            | Self::EscrowCallFailed { .. } => ErrorClass::Upstream,
            Self::TickSkipped
            | Self::ArithmeticOverflow { .. }
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// The `SF_ERR_nnn` code at the head of the display string.
    #[must_use]
    pub fn code(&self) -> String {
        let msg = self.to_string();
        msg.split(':').next().unwrap_or_default().to_string()
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, StakeflowError>;

impl From<serde_json::Error> for StakeflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = StakeflowError::NotBridge {
            caller: AccountId::new(),
        };
        let msg = format!("{err}");
        assert!(msg.starts_with("SF_ERR_201"), "Got: {msg}");
    }

    #[test]
    fn redeem_mismatch_display() {
        let err = StakeflowError::RedeemAmountNotMatch {
            supplied: Decimal::new(1500, 0),
            matched: Decimal::new(1000, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("SF_ERR_401"));
        assert!(msg.contains("1500"));
        assert!(msg.contains("1000"));
    }

    #[test]
    fn classes_follow_code_ranges() {
        let cases = [
            (StakeflowError::ZeroAmount, ErrorClass::Validation, '1'),
            (
                StakeflowError::NotOwner {
                    caller: AccountId::new(),
                },
                ErrorClass::Authorization,
                '2',
            ),
            (StakeflowError::NoClaimableInterest, ErrorClass::Insufficiency, '3'),
            (StakeflowError::RedeemQueueEmpty, ErrorClass::Consistency, '4'),
            (
                StakeflowError::RegistryCallFailed {
                    reason: "down".into(),
                },
                ErrorClass::Upstream,
                '5',
            ),
            (StakeflowError::TickSkipped, ErrorClass::Internal, '9'),
        ];
        for (err, class, digit) in cases {
            assert_eq!(err.class(), class, "{err}");
            assert_eq!(err.code().chars().nth(7), Some(digit), "{err}");
        }
    }

    #[test]
    fn code_extracts_prefix() {
        assert_eq!(StakeflowError::ZeroAmount.code(), "SF_ERR_100");
        assert_eq!(StakeflowError::Internal("x".into()).code(), "SF_ERR_999");
    }

    #[test]
    fn serde_json_errors_convert() {
        let err: StakeflowError = serde_json::from_str::<u64>("nope").unwrap_err().into();
        assert!(matches!(err, StakeflowError::Serialization(_)));
    }
}
