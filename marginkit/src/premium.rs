//! Conversion between operator risk targets and margin-engine premiums.
//!
//! The margin engine stores each market's risk as a premium on top of a
//! protocol-wide base value:
//!
//! ```text
//! effective = base * (1 + premium)   =>   premium = target / base - 1
//! ```
//!
//! Premiums are pure functions of the base values passed in. Callers must
//! recompute them whenever the base changes.

use rust_decimal::Decimal;

use crate::error::{RiskError, Result};
use crate::types::{
    CollateralRatio, Premium, Ratio, TargetCollateralization, TargetLiquidationPenalty,
};

/// Premium that turns `base` collateralization into `target`.
///
/// # Errors
///
/// Returns `RiskError::NegativePremium` if `target` is below `base`; the
/// engine cannot express a market riskier than the protocol base.
pub fn margin_premium(base: &CollateralRatio, target: TargetCollateralization) -> Result<Premium> {
    match target {
        TargetCollateralization::Base => Ok(Premium::ZERO),
        TargetCollateralization::Ratio(target) => {
            relative_premium(base.value(), target.value(), &base.to_string(), &target.to_string())
        }
    }
}

/// Premium that turns the base liquidation spread into `target`.
///
/// # Errors
///
/// Returns `RiskError::NegativePremium` if `target` is below the base spread,
/// and `RiskError::InvalidAmount` if the base spread is zero.
pub fn liquidation_premium(base_spread: &Ratio, target: TargetLiquidationPenalty) -> Result<Premium> {
    match target {
        TargetLiquidationPenalty::Base => Ok(Premium::ZERO),
        TargetLiquidationPenalty::Penalty(target) => {
            if base_spread.is_zero() {
                return Err(RiskError::InvalidAmount(format!(
                    "cannot express liquidation penalty {target} against a zero base spread"
                )));
            }
            relative_premium(
                base_spread.value(),
                target.value(),
                &base_spread.to_string(),
                &target.to_string(),
            )
        }
    }
}

fn relative_premium(base: Decimal, target: Decimal, base_s: &str, target_s: &str) -> Result<Premium> {
    let premium = target
        .checked_div(base)
        .and_then(|q| q.checked_sub(Decimal::ONE))
        .ok_or_else(|| RiskError::MathOverflow(format!("{target_s} / {base_s}")))?;
    if premium.is_sign_negative() && !premium.is_zero() {
        return Err(RiskError::NegativePremium {
            base: base_s.to_string(),
            target: target_s.to_string(),
        });
    }
    Premium::new(premium)
}

/// Collateralization a market actually requires: `base * (1 + premium)`.
pub fn effective_collateralization(base: &CollateralRatio, premium: Premium) -> Result<CollateralRatio> {
    CollateralRatio::new(apply_premium(base.value(), premium)?)
}

/// Liquidation penalty a market actually pays: `spread * (1 + premium)`.
pub fn effective_liquidation_penalty(base_spread: &Ratio, premium: Premium) -> Result<Ratio> {
    Ratio::new(apply_premium(base_spread.value(), premium)?)
}

fn apply_premium(base: Decimal, premium: Premium) -> Result<Decimal> {
    Decimal::ONE
        .checked_add(premium.value())
        .and_then(|factor| base.checked_mul(factor))
        .ok_or_else(|| RiskError::MathOverflow(format!("{base} * (1 + {premium})")))
}
