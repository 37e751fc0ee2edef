//! Decimal normalizer: raw fixed-point integers <-> canonical [`Decimal`].
//!
//! Upstream sources report prices as `(value, decimals)` integer pairs. The
//! engine works on `rust_decimal::Decimal` with at most
//! [`CANONICAL_DECIMALS`] fractional digits; digits beyond that (or beyond the
//! 96-bit mantissa) are dropped only when they are negligible.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::{RiskError, Result};

/// Fractional digits kept by the canonical representation (WAD).
pub const CANONICAL_DECIMALS: u32 = 18;

/// Prices handed to the margin engine carry `36 - token_decimals` decimals,
/// so that `price * amount` is always a 36-decimal USD value.
pub const PROTOCOL_PRICE_DECIMALS: u32 = 36;

/// Rescaling may drop at most `1 / PRECISION_TOLERANCE` of a value.
pub const PRECISION_TOLERANCE: u128 = 1_000_000_000_000;

/// Largest mantissa a `Decimal` can hold (2^96 - 1).
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("{value} with {decimals} decimals loses more than 1e-12 of its value when rescaled")]
    PrecisionLoss { value: u128, decimals: u8 },

    #[error("{value} with {decimals} decimals is out of range")]
    OutOfRange { value: u128, decimals: u8 },
}

/// Rescale a raw `(value, decimals)` pair into a canonical `Decimal`.
pub fn normalize(value: u128, decimals: u8) -> std::result::Result<Decimal, NormalizeError> {
    let mut mantissa = value;
    let mut scale = u32::from(decimals);
    let mut dropped = 0u32;

    while scale > CANONICAL_DECIMALS || mantissa > MAX_MANTISSA {
        if scale == 0 {
            return Err(NormalizeError::OutOfRange { value, decimals });
        }
        mantissa /= 10;
        scale -= 1;
        dropped += 1;
    }

    if dropped > 0 {
        // A power that overflows u128 means every digit was dropped.
        let kept = 10u128
            .checked_pow(dropped)
            .and_then(|p| mantissa.checked_mul(p))
            .unwrap_or(0);
        let lost = value - kept;
        if lost > value / PRECISION_TOLERANCE {
            return Err(NormalizeError::PrecisionLoss { value, decimals });
        }
    }

    Decimal::try_from_i128_with_scale(mantissa as i128, scale)
        .map_err(|_| NormalizeError::OutOfRange { value, decimals })
}

/// Convert a non-negative Decimal to an integer scaled by `10^decimals`,
/// truncating any digits beyond `decimals`.
///
/// # Errors
///
/// Returns `RiskError::InvalidAmount` for negative input and
/// `RiskError::MathOverflow` if the result does not fit in a `u128`.
pub fn to_scaled_u128(x: Decimal, decimals: u32) -> Result<u128> {
    if x.is_sign_negative() && !x.is_zero() {
        return Err(RiskError::InvalidAmount(format!("{x} is negative")));
    }
    let mantissa = x.mantissa().unsigned_abs();
    let scale = x.scale();

    if decimals >= scale {
        10u128
            .checked_pow(decimals - scale)
            .and_then(|p| mantissa.checked_mul(p))
            .ok_or_else(|| RiskError::MathOverflow(format!("to_scaled_u128: {x} * 10^{decimals}")))
    } else {
        Ok(10u128
            .checked_pow(scale - decimals)
            .map_or(0, |p| mantissa / p))
    }
}

/// Convert a human-readable ("UI") token amount into base units.
///
/// # Errors
///
/// Returns `RiskError::InvalidAmount` if the amount is negative or carries
/// more fractional digits than the token supports.
pub fn ui_to_base_units(amount: Decimal, decimals: u8) -> Result<u128> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(RiskError::InvalidAmount(format!("{amount} is negative")));
    }
    if amount.round_dp(u32::from(decimals)) != amount {
        return Err(RiskError::InvalidAmount(format!(
            "{amount} has more than {decimals} decimal places"
        )));
    }
    to_scaled_u128(amount, u32::from(decimals))
}
