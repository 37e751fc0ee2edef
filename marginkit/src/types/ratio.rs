//! Validated fixed-point ratios and the symbolic risk targets built on them.
//!
//! Ratios parse from either percentage strings (`"125%"`) or plain decimals
//! (`"1.25"`). Out-of-range values fail at construction, so a
//! [`CollateralRatio`] below 1.0 or a negative [`Ratio`] cannot exist.

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::decimals::{to_scaled_u128, CANONICAL_DECIMALS};
use crate::error::{RiskError, Result};

/// Keyword accepted in place of a ratio meaning "use the protocol base value".
pub const BASE_KEYWORD: &str = "base";

fn parse_decimal(input: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    let (number, is_percent) = match trimmed.strip_suffix('%') {
        Some(n) => (n.trim(), true),
        None => (trimmed, false),
    };
    let value = Decimal::from_str(number)
        .map_err(|e| RiskError::InvalidRatio(format!("{input:?}: {e}")))?;
    Ok(if is_percent {
        value / Decimal::ONE_HUNDRED
    } else {
        value
    })
}

fn format_percent(f: &mut fmt::Formatter<'_>, value: Decimal) -> fmt::Result {
    write!(f, "{}%", (value * Decimal::ONE_HUNDRED).normalize())
}

// ---------------------------------------------------------------------------
// Ratio
// ---------------------------------------------------------------------------

/// Non-negative ratio (e.g. a liquidation spread of 5% is `0.05`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ratio(Decimal);

impl Ratio {
    pub const ZERO: Ratio = Ratio(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(RiskError::InvalidRatio(format!("{value} is negative")));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl FromStr for Ratio {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(parse_decimal(s)?)
    }
}

impl TryFrom<String> for Ratio {
    type Error = RiskError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ratio> for String {
    fn from(value: Ratio) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_percent(f, self.0)
    }
}

// ---------------------------------------------------------------------------
// CollateralRatio
// ---------------------------------------------------------------------------

/// Collateralization ratio, always `>= 1.0` (100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollateralRatio(Decimal);

impl CollateralRatio {
    pub fn new(value: Decimal) -> Result<Self> {
        if value < Decimal::ONE {
            return Err(RiskError::InvalidRatio(format!(
                "collateralization {value} is below 100%"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl FromStr for CollateralRatio {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(parse_decimal(s)?)
    }
}

impl TryFrom<String> for CollateralRatio {
    type Error = RiskError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CollateralRatio> for String {
    fn from(value: CollateralRatio) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CollateralRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_percent(f, self.0)
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// Operator intent for a market's minimum collateralization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetCollateralization {
    /// Use the protocol's base collateralization unchanged.
    Base,
    Ratio(CollateralRatio),
}

impl FromStr for TargetCollateralization {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(BASE_KEYWORD) {
            return Ok(Self::Base);
        }
        Ok(Self::Ratio(s.parse()?))
    }
}

impl TryFrom<String> for TargetCollateralization {
    type Error = RiskError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TargetCollateralization> for String {
    fn from(value: TargetCollateralization) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TargetCollateralization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str(BASE_KEYWORD),
            Self::Ratio(r) => r.fmt(f),
        }
    }
}

/// Operator intent for a market's liquidation penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TargetLiquidationPenalty {
    /// Use the protocol's base liquidation spread unchanged.
    Base,
    Penalty(Ratio),
}

impl FromStr for TargetLiquidationPenalty {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(BASE_KEYWORD) {
            return Ok(Self::Base);
        }
        Ok(Self::Penalty(s.parse()?))
    }
}

impl TryFrom<String> for TargetLiquidationPenalty {
    type Error = RiskError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TargetLiquidationPenalty> for String {
    fn from(value: TargetLiquidationPenalty) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TargetLiquidationPenalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base => f.write_str(BASE_KEYWORD),
            Self::Penalty(r) => r.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Premium
// ---------------------------------------------------------------------------

/// Non-negative delta stored by the margin engine, relative to a base value.
///
/// Values are truncated to 18 fractional digits so they map 1:1 onto the
/// engine's WAD representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Premium(Decimal);

impl Premium {
    pub const ZERO: Premium = Premium(Decimal::ZERO);

    pub fn new(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(RiskError::InvalidRatio(format!("premium {value} is negative")));
        }
        Ok(Self(
            value
                .round_dp_with_strategy(CANONICAL_DECIMALS, RoundingStrategy::ToZero)
                .normalize(),
        ))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The premium as an 18-decimal fixed-point integer.
    pub fn to_wad(&self) -> Result<u128> {
        to_scaled_u128(self.0, CANONICAL_DECIMALS)
    }
}

impl TryFrom<Decimal> for Premium {
    type Error = RiskError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Premium> for Decimal {
    fn from(value: Premium) -> Self {
        value.0
    }
}

impl fmt::Display for Premium {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BaseRates
// ---------------------------------------------------------------------------

/// Protocol-wide values the premiums are expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseRates {
    pub collateralization: CollateralRatio,
    pub liquidation_spread: Ratio,
}
