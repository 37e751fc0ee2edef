//! Network configuration: one immutable descriptor per chain.
//!
//! Chains differ only in which oracle adapters they support, which tokens
//! exist, and where the protocol's contracts live. A `NetworkConfig` is
//! loaded once at startup, shared behind an `Arc`, and replaced wholesale on
//! redeploy.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RiskError, Result};
use crate::types::{Address, BaseRates, OracleAdapter, Token};

/// Read-path bounds for the oracle aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleSettings {
    /// Maximum age of a source quote, in seconds.
    pub max_staleness_secs: u64,
    /// Per-source fetch timeout, in milliseconds.
    pub source_timeout_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            max_staleness_secs: 24 * 60 * 60,
            source_timeout_ms: 5_000,
        }
    }
}

impl OracleSettings {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }
}

/// Capability descriptor and address book for one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Human-readable network name (e.g. `arbitrum-one`).
    pub name: String,
    pub chain_id: u64,
    /// Oracle adapter kinds deployed on this chain.
    pub adapters: BTreeSet<OracleAdapter>,
    pub tokens: Vec<Token>,
    /// Contract name -> address.
    #[serde(default)]
    pub contracts: BTreeMap<String, Address>,
    /// Current protocol base rates, as last read from the margin engine.
    pub base_rates: BaseRates,
    #[serde(default)]
    pub oracle: OracleSettings,
}

impl NetworkConfig {
    /// Parse and validate a network config from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: NetworkConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a network config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<()> {
        let mut symbols = BTreeSet::new();
        let mut addresses = BTreeSet::new();
        for token in &self.tokens {
            if !symbols.insert(token.symbol.as_str()) {
                return Err(RiskError::Config(format!(
                    "{}: duplicate token symbol {}",
                    self.name, token.symbol
                )));
            }
            if !addresses.insert(&token.address) {
                return Err(RiskError::Config(format!(
                    "{}: duplicate token address {}",
                    self.name, token.address
                )));
            }
        }
        if self.oracle.source_timeout_ms == 0 {
            return Err(RiskError::Config(format!(
                "{}: oracle.sourceTimeoutMs must be positive",
                self.name
            )));
        }
        Ok(())
    }

    pub fn supports(&self, adapter: OracleAdapter) -> bool {
        self.adapters.contains(&adapter)
    }

    /// Look up a token by symbol (case-insensitive).
    pub fn token(&self, symbol: &str) -> Result<&Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| RiskError::UnknownToken(format!("{symbol} on {}", self.name)))
    }

    pub fn token_by_address(&self, address: &Address) -> Result<&Token> {
        self.tokens
            .iter()
            .find(|t| &t.address == address)
            .ok_or_else(|| RiskError::UnknownToken(format!("{address} on {}", self.name)))
    }

    /// The network's own entry for `token`.
    ///
    /// Fails with `UnknownToken` if the address is not on this network and
    /// with `DecimalMismatch` if the caller's decimals disagree with it.
    pub fn known_token(&self, token: &Token) -> Result<&Token> {
        let known = self.token_by_address(&token.address)?;
        if known.decimals != token.decimals || known.decimals_override != token.decimals_override {
            return Err(RiskError::DecimalMismatch {
                token: known.to_string(),
                reason: format!(
                    "network declares {} decimals (oracle {}), got {} (oracle {})",
                    known.decimals,
                    known.oracle_decimals(),
                    token.decimals,
                    token.oracle_decimals()
                ),
            });
        }
        Ok(known)
    }

    pub fn contract(&self, name: &str) -> Result<&Address> {
        self.contracts
            .get(name)
            .ok_or_else(|| RiskError::UnknownContract(format!("{name} on {}", self.name)))
    }
}
