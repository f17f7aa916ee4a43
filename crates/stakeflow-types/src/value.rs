//! Value arithmetic helpers.
//!
//! All value amounts are [`Decimal`] in whole units. Divisions truncate
//! toward zero at [`VALUE_PRECISION`] places so that every ledger rounds in
//! its own favour, never the caller's.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    Result, StakeflowError,
    constants::{CFX_PER_VOTE, VALUE_PRECISION},
};

/// Value of `votes` whole votes.
#[must_use]
pub fn votes_to_value(votes: u64) -> Decimal {
    Decimal::from(votes) * Decimal::from(CFX_PER_VOTE)
}

/// Number of whole votes `value` buys, rounding down.
#[must_use]
pub fn value_to_votes_floor(value: Decimal) -> u64 {
    if value <= Decimal::ZERO {
        return 0;
    }
    let votes = (value / Decimal::from(CFX_PER_VOTE)).trunc();
    u64::try_from(votes).unwrap_or(u64::MAX)
}

/// Number of whole votes needed to cover `value`, rounding up.
///
/// Used wherever an unstake must be *sufficient* despite truncation.
#[must_use]
pub fn value_to_votes_ceil(value: Decimal) -> u64 {
    if value <= Decimal::ZERO {
        return 0;
    }
    let votes = (value / Decimal::from(CFX_PER_VOTE)).ceil();
    u64::try_from(votes).unwrap_or(u64::MAX)
}

/// Truncate to ledger precision.
#[must_use]
pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(VALUE_PRECISION, RoundingStrategy::ToZero)
}

/// `a * b / c`, truncated to ledger precision.
///
/// # Errors
/// `ArithmeticOverflow` if the product overflows or `c` is zero.
pub fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal> {
    let product = a.checked_mul(b).ok_or_else(|| overflow("mul_div product"))?;
    let quotient = product
        .checked_div(c)
        .ok_or_else(|| overflow("mul_div quotient"))?;
    Ok(truncate(quotient))
}

/// `amount * ratio / base` for integer ratios.
///
/// # Errors
/// `ArithmeticOverflow` on overflow.
pub fn apply_ratio(amount: Decimal, ratio: u64, base: u64) -> Result<Decimal> {
    mul_div(amount, Decimal::from(ratio), Decimal::from(base))
}

/// Checked addition that reports which quantity overflowed.
///
/// # Errors
/// `ArithmeticOverflow` on overflow.
pub fn checked_add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| overflow(what))
}

fn overflow(what: &str) -> StakeflowError {
    StakeflowError::ArithmeticOverflow {
        context: what.to_string(),
    }
}
