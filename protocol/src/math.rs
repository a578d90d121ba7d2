//! # Checked Fixed-Point Helpers
//!
//! All share and vault arithmetic reduces to `a * b / c`. The product is
//! widened to `u128` so no intermediate can overflow, and the quotient is
//! narrowed back to [`Amount`] with an explicit error if it doesn't fit.

use thiserror::Error;

use crate::Amount;

/// Arithmetic failures. Every one of these aborts the enclosing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    /// A result does not fit in the target integer type.
    #[error("arithmetic overflow")]
    Overflow,

    /// A subtraction would go below zero.
    #[error("arithmetic underflow")]
    Underflow,

    /// Division by a zero denominator.
    #[error("division by zero")]
    DivisionByZero,
}

/// Computes `floor(a * b / denom)`.
pub fn mul_div_down(a: Amount, b: Amount, denom: Amount) -> Result<Amount, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    let out = (a as u128) * (b as u128) / (denom as u128);
    Amount::try_from(out).map_err(|_| MathError::Overflow)
}

/// Computes `ceil(a * b / denom)`.
pub fn mul_div_up(a: Amount, b: Amount, denom: Amount) -> Result<Amount, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    let num = (a as u128) * (b as u128);
    let denom = denom as u128;
    let out = num / denom + u128::from(num % denom != 0);
    Amount::try_from(out).map_err(|_| MathError::Overflow)
}

/// Checked addition.
pub fn add(a: Amount, b: Amount) -> Result<Amount, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// Checked subtraction.
pub fn sub(a: Amount, b: Amount) -> Result<Amount, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// Computes `value * scale / supply` as a `u128` price.
pub fn scaled_ratio(value: Amount, supply: Amount, scale: u128) -> Result<u128, MathError> {
    if supply == 0 {
        return Err(MathError::DivisionByZero);
    }
    (value as u128)
        .checked_mul(scale)
        .map(|n| n / supply as u128)
        .ok_or(MathError::Overflow)
}
