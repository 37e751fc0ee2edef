use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RiskError, Result};
use crate::utils::decode_hex;

/// Chain-scoped 20-byte address, stored lowercase with a `0x` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(value: &str) -> Result<Self> {
        let bytes = decode_hex(value)?;
        if bytes.len() != 20 {
            return Err(RiskError::InvalidAddress(format!(
                "{value}: expected 20 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = RiskError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A token known to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    /// ERC-20 decimals.
    pub decimals: u8,
    /// Oracle decimals for tokens whose price is not expressed in `decimals`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals_override: Option<u8>,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            decimals_override: None,
        }
    }

    pub fn with_decimals_override(mut self, decimals: u8) -> Self {
        self.decimals_override = Some(decimals);
        self
    }

    /// Decimals an oracle config for this token must declare.
    pub fn oracle_decimals(&self) -> u8 {
        self.decimals_override.unwrap_or(self.decimals)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.address)
    }
}
