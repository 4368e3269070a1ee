//! Fixed-point helpers used by every curve.
//!
//! All computation is integer-only. Products that can exceed `u128` are
//! carried in a 256-bit intermediate and only narrowed after division.

use primitive_types::U256;

use crate::constants::{BPS_PRECISION, LOG_FRACTION_BITS, MULTIPLIER_PRECISION};
use crate::error::MathError;

/// Compute `floor(a * b / d)` without intermediate overflow.
///
/// Fails with [`MathError::DivisionByZero`] when `d == 0` and with
/// [`MathError::Overflow`] when the quotient does not fit in `u128`.
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / d);
    }
    // a, b < 2^128 so the 256-bit product cannot overflow.
    let wide = U256::from(a) * U256::from(b) / U256::from(d);
    if wide > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(wide.as_u128())
}

/// Apply a basis-point rate: `floor(amount * bps / 10_000)`.
pub fn apply_bps(amount: u128, bps: u128) -> Result<u128, MathError> {
    mul_div(amount, bps, BPS_PRECISION)
}

/// Apply a multiplier on the 1_000 = 1.0x scale.
pub fn apply_multiplier(amount: u128, multiplier: u128) -> Result<u128, MathError> {
    mul_div(amount, multiplier, MULTIPLIER_PRECISION)
}

/// Base-2 logarithm of `x` in Q32 fixed point (`1 << 32` represents 1.0).
///
/// The integer part is the bit length; the fractional bits come from
/// repeatedly squaring the normalised mantissa. Returns 0 for `x == 0`.
pub fn log2_q32(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let int_part = 63 - x.leading_zeros() as u64;
    let mut result = int_part << LOG_FRACTION_BITS;

    // Mantissa in Q62, normalised into [1.0, 2.0).
    const ONE: u128 = 1 << 62;
    let mut m = (x as u128) << (62 - int_part);

    for bit in (0..LOG_FRACTION_BITS).rev() {
        // m < 2^63, so m^2 < 2^126.
        m = (m * m) >> 62;
        if m >= 2 * ONE {
            m >>= 1;
            result |= 1u64 << bit;
        }
    }

    result
}
