use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimals::{to_scaled_u128, PROTOCOL_PRICE_DECIMALS};
use crate::error::{RiskError, Result};
use crate::types::Address;

/// Name under which a price source adapter is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of upstream adapter behind a [`SourceRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OracleAdapter {
    Chainlink,
    Chronicle,
    Redstone,
    PendlePt,
    Twap,
    Erc4626,
    /// Fixed quotes, used for tests and dry runs.
    Static,
    /// Quotes read from a local JSON file.
    File,
}

impl fmt::Display for OracleAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Chainlink => "CHAINLINK",
            Self::Chronicle => "CHRONICLE",
            Self::Redstone => "REDSTONE",
            Self::PendlePt => "PENDLE_PT",
            Self::Twap => "TWAP",
            Self::Erc4626 => "ERC4626",
            Self::Static => "STATIC",
            Self::File => "FILE",
        };
        f.write_str(s)
    }
}

/// One weighted source in a token's aggregated price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceSourceEntry {
    pub source: SourceRef,
    /// `None`: the source quotes USD. `Some(t)`: the source quotes in units of `t`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_token: Option<Address>,
    /// Percentage weight; a config's weights sum to 100.
    pub weight: u32,
}

impl PriceSourceEntry {
    pub fn usd(source: impl Into<String>, weight: u32) -> Self {
        Self {
            source: SourceRef::new(source),
            pair_token: None,
            weight,
        }
    }

    pub fn paired(source: impl Into<String>, pair_token: Address, weight: u32) -> Self {
        Self {
            source: SourceRef::new(source),
            pair_token: Some(pair_token),
            weight,
        }
    }
}

/// Full oracle configuration for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPriceConfig {
    pub token: Address,
    pub decimals: u8,
    pub sources: Vec<PriceSourceEntry>,
}

/// A single reading from an upstream price source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceQuote {
    pub value: u128,
    pub decimals: u8,
    /// Unix seconds at which the upstream value was produced.
    pub as_of: u64,
}

/// Canonical aggregated price of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub token: Address,
    /// USD per whole token.
    pub value: Decimal,
    /// Oracle decimals of the token.
    pub decimals: u8,
}

impl Price {
    /// Price in the margin engine's representation: `value * 10^(36 - decimals)`.
    pub fn to_protocol_units(&self) -> Result<u128> {
        let decimals = u32::from(self.decimals);
        if decimals > PROTOCOL_PRICE_DECIMALS {
            return Err(RiskError::DecimalMismatch {
                token: self.token.to_string(),
                reason: format!("{decimals} decimals exceed {PROTOCOL_PRICE_DECIMALS}"),
            });
        }
        to_scaled_u128(self.value, PROTOCOL_PRICE_DECIMALS - decimals)
    }
}
