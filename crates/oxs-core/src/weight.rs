//! Staking weight curve.
//!
//! `weight = amount * (100 + min(p, 100)) * (104 + min(l, 104))`
//!
//! The productivity and lock factors each span 1.0x..2.0x. Inputs above the
//! caps are clamped so out-of-range metrics cannot inflate the weighted total.

use crate::constants::{LOCK_BASE, MAX_LOCK_WEEKS, MAX_PRODUCTIVITY, PRODUCTIVITY_BASE};
use crate::error::MathError;

/// Compute the staking weight for a participant's metrics.
///
/// Never overflows for amounts up to the total supply; larger amounts that
/// would exceed `u128` return [`MathError::Overflow`].
pub fn user_weight(amount: u128, productivity: u32, lock_weeks: u32) -> Result<u128, MathError> {
    let p = productivity.min(MAX_PRODUCTIVITY) as u128;
    let l = lock_weeks.min(MAX_LOCK_WEEKS) as u128;
    amount
        .checked_mul(PRODUCTIVITY_BASE + p)
        .and_then(|v| v.checked_mul(LOCK_BASE + l))
        .ok_or(MathError::Overflow)
}
