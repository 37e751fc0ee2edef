//! Weighted multi-source price aggregation.
//!
//! Each token maps to an ordered list of `(source, pair_token, weight)`
//! entries. A read fans out to every source concurrently, normalizes each
//! quote, multiplies by the pair token's own aggregated price when the quote
//! is pair-denominated, and returns the percentage-weighted sum.
//!
//! Any failing source fails the whole read. Weights are never renormalized
//! over the sources that happened to answer.

pub mod source;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::time;
use tracing::{debug, info};

use crate::config::{NetworkConfig, OracleSettings};
use crate::decimals::{normalize, CANONICAL_DECIMALS};
use crate::error::{RiskError, Result};
use crate::types::{
    Address, AggregatedPriceConfig, OracleAdapter, Price, PriceSourceEntry, SourceRef, Token,
};
use crate::utils::now_unix_secs;

pub use source::{PriceSource, QuoteFileSource, QuoteFuture, StaticPriceSource};

/// Maximum number of pair hops from a token to a USD-quoted source.
pub const MAX_PAIR_DEPTH: usize = 4;

/// Percentage basis the weights of one config must sum to.
pub const TOTAL_WEIGHT: u64 = 100;

type ValueFuture<'a> = Pin<Box<dyn Future<Output = Result<Decimal>> + Send + 'a>>;

/// A price source together with its adapter kind.
#[derive(Clone)]
pub struct RegisteredSource {
    pub adapter: OracleAdapter,
    source: Arc<dyn PriceSource>,
}

impl fmt::Debug for RegisteredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSource")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

/// Per-token oracle configs plus the sources they read from.
#[derive(Debug, Clone)]
pub struct OracleAggregator {
    settings: OracleSettings,
    adapters: BTreeSet<OracleAdapter>,
    sources: HashMap<SourceRef, RegisteredSource>,
    configs: HashMap<Address, AggregatedPriceConfig>,
}

impl OracleAggregator {
    /// Create an empty aggregator accepting the given adapter kinds.
    pub fn new(settings: OracleSettings, adapters: impl IntoIterator<Item = OracleAdapter>) -> Self {
        Self {
            settings,
            adapters: adapters.into_iter().collect(),
            sources: HashMap::new(),
            configs: HashMap::new(),
        }
    }

    pub fn for_network(network: &NetworkConfig) -> Self {
        Self::new(network.oracle, network.adapters.iter().copied())
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    // --- Sources ---

    /// Register (or replace) a price source under `name`.
    ///
    /// # Errors
    ///
    /// Returns `RiskError::UnsupportedAdapter` if the adapter kind is not
    /// available on this network.
    pub fn register_source(
        &mut self,
        name: SourceRef,
        adapter: OracleAdapter,
        source: Arc<dyn PriceSource>,
    ) -> Result<()> {
        if !self.adapters.contains(&adapter) {
            return Err(RiskError::UnsupportedAdapter {
                source_ref: name.to_string(),
                adapter: adapter.to_string(),
            });
        }
        let replaced = self
            .sources
            .insert(name.clone(), RegisteredSource { adapter, source })
            .is_some();
        info!(source = %name, %adapter, replaced, "price source registered");
        Ok(())
    }

    pub fn source_adapter(&self, name: &SourceRef) -> Option<OracleAdapter> {
        self.sources.get(name).map(|s| s.adapter)
    }

    // --- Configs ---

    /// Install or replace the full oracle config for `token`.
    ///
    /// The config is validated against the current state first; on error
    /// nothing changes.
    pub fn insert_or_update_token(
        &mut self,
        token: &Token,
        decimals: u8,
        sources: Vec<PriceSourceEntry>,
    ) -> Result<()> {
        let config = AggregatedPriceConfig {
            token: token.address.clone(),
            decimals,
            sources,
        };
        self.validate(token, &config)?;

        info!(
            token = %token,
            decimals,
            sources = config.sources.len(),
            "oracle config installed"
        );
        self.configs.insert(config.token.clone(), config);
        Ok(())
    }

    pub fn config(&self, token: &Address) -> Option<&AggregatedPriceConfig> {
        self.configs.get(token)
    }

    pub fn has_config(&self, token: &Address) -> bool {
        self.configs.contains_key(token)
    }

    /// All installed configs, ordered by token address.
    pub fn configs(&self) -> Vec<&AggregatedPriceConfig> {
        let mut all: Vec<_> = self.configs.values().collect();
        all.sort_by(|a, b| a.token.cmp(&b.token));
        all
    }

    fn validate(&self, token: &Token, config: &AggregatedPriceConfig) -> Result<()> {
        let invalid_weight = |reason: String| RiskError::InvalidWeight {
            token: token.to_string(),
            reason,
        };

        if config.sources.is_empty() {
            return Err(invalid_weight("no price sources".into()));
        }
        if let Some(entry) = config.sources.iter().find(|e| e.weight == 0) {
            return Err(invalid_weight(format!("source {} has zero weight", entry.source)));
        }
        let total: u64 = config.sources.iter().map(|e| u64::from(e.weight)).sum();
        if total != TOTAL_WEIGHT {
            return Err(invalid_weight(format!(
                "weights sum to {total}, expected {TOTAL_WEIGHT}"
            )));
        }

        if let Some(entry) = config
            .sources
            .iter()
            .find(|e| !self.sources.contains_key(&e.source))
        {
            return Err(RiskError::MissingPriceSource {
                token: token.to_string(),
                source_ref: entry.source.to_string(),
                reason: "source is not registered".into(),
            });
        }

        if config.decimals != token.oracle_decimals() {
            return Err(RiskError::DecimalMismatch {
                token: token.to_string(),
                reason: format!(
                    "config declares {} decimals, token expects {}",
                    config.decimals,
                    token.oracle_decimals()
                ),
            });
        }

        // Tokens already paired into this one read through its new chain too.
        let upstream = self.hops_into(&config.token, 0);
        let mut path = vec![config.token.clone()];
        self.check_pair_chain(config, config, &mut path, upstream)
    }

    /// Depth-first walk of the pair graph as it would look with `root`
    /// installed. `path` holds the tokens from `root` to `current`;
    /// `upstream` is the longest chain of installed configs ending at `root`.
    fn check_pair_chain(
        &self,
        root: &AggregatedPriceConfig,
        current: &AggregatedPriceConfig,
        path: &mut Vec<Address>,
        upstream: usize,
    ) -> Result<()> {
        for pair in current.sources.iter().filter_map(|e| e.pair_token.as_ref()) {
            if path.contains(pair) {
                return Err(cyclic_pair(&root.token, path, pair, "cycle"));
            }
            if upstream + path.len() > MAX_PAIR_DEPTH {
                let why = if upstream == 0 {
                    format!("deeper than {MAX_PAIR_DEPTH} hops")
                } else {
                    format!("deeper than {MAX_PAIR_DEPTH} hops including {upstream} into it")
                };
                return Err(cyclic_pair(&root.token, path, pair, &why));
            }
            // Pairs without a config are allowed; they fail at read time.
            let Some(next) = self.configs.get(pair) else {
                continue;
            };
            path.push(pair.clone());
            self.check_pair_chain(root, next, path, upstream)?;
            path.pop();
        }
        Ok(())
    }

    /// Longest chain of installed configs that pairs into `token`.
    fn hops_into(&self, token: &Address, depth: usize) -> usize {
        if depth > MAX_PAIR_DEPTH {
            return depth;
        }
        self.configs
            .values()
            .filter(|c| {
                c.token != *token && c.sources.iter().any(|e| e.pair_token.as_ref() == Some(token))
            })
            .map(|c| self.hops_into(&c.token, depth + 1))
            .max()
            .unwrap_or(depth)
    }

    // --- Reads ---

    /// Aggregated price of `token` at the current time.
    pub async fn get_price(&self, token: &Address) -> Result<Price> {
        self.get_price_at(token, now_unix_secs()).await
    }

    /// Aggregated price of `token`, judging staleness against `now` (Unix s).
    pub async fn get_price_at(&self, token: &Address, now: u64) -> Result<Price> {
        let config = self
            .configs
            .get(token)
            .ok_or_else(|| RiskError::UnknownOracleConfig(token.to_string()))?;
        let value = self.resolve(token, now, 0).await?;
        Ok(Price {
            token: token.clone(),
            value: value
                .round_dp_with_strategy(CANONICAL_DECIMALS, RoundingStrategy::ToZero)
                .normalize(),
            decimals: config.decimals,
        })
    }

    fn resolve<'a>(&'a self, token: &'a Address, now: u64, depth: usize) -> ValueFuture<'a> {
        Box::pin(async move {
            if depth > MAX_PAIR_DEPTH {
                return Err(RiskError::CyclicTokenPair {
                    token: token.to_string(),
                    path: format!("pair chain deeper than {MAX_PAIR_DEPTH} hops"),
                });
            }
            let config = self
                .configs
                .get(token)
                .ok_or_else(|| RiskError::UnknownOracleConfig(token.to_string()))?;

            let reads = config
                .sources
                .iter()
                .map(|entry| self.read_entry(token, entry, now, depth));
            let values = join_all(reads).await;

            let mut total = Decimal::ZERO;
            for (entry, value) in config.sources.iter().zip(values) {
                let weighted = value?
                    .checked_mul(Decimal::from(entry.weight))
                    .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                    .and_then(|v| total.checked_add(v));
                total = weighted.ok_or_else(|| {
                    RiskError::MathOverflow(format!("weighted sum for {token}"))
                })?;
            }
            Ok(total)
        })
    }

    async fn read_entry(
        &self,
        token: &Address,
        entry: &PriceSourceEntry,
        now: u64,
        depth: usize,
    ) -> Result<Decimal> {
        let missing = |reason: String| RiskError::MissingPriceSource {
            token: token.to_string(),
            source_ref: entry.source.to_string(),
            reason,
        };

        let registered = self
            .sources
            .get(&entry.source)
            .ok_or_else(|| missing("source is not registered".into()))?;

        let timeout = self.settings.source_timeout();
        let quote = match time::timeout(timeout, registered.source.get_price(token)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => return Err(missing(e.to_string())),
            Err(_) => return Err(missing(format!("timed out after {timeout:?}"))),
        };

        let age_secs = now.saturating_sub(quote.as_of);
        if age_secs > self.settings.max_staleness_secs {
            return Err(RiskError::StalePriceData {
                token: token.to_string(),
                source_ref: entry.source.to_string(),
                age_secs,
                max_age_secs: self.settings.max_staleness_secs,
            });
        }
        if quote.value == 0 {
            return Err(missing("source reported a zero price".into()));
        }

        let mut value =
            normalize(quote.value, quote.decimals).map_err(|e| RiskError::DecimalMismatch {
                token: token.to_string(),
                reason: format!("{} quote: {e}", entry.source),
            })?;

        if let Some(pair) = &entry.pair_token {
            let pair_value = self.resolve(pair, now, depth + 1).await?;
            value = value.checked_mul(pair_value).ok_or_else(|| {
                RiskError::MathOverflow(format!("{token} priced through {pair}"))
            })?;
        }

        debug!(
            token = %token,
            source = %entry.source,
            weight = entry.weight,
            value = %value,
            age_secs,
            "source read"
        );
        Ok(value)
    }
}

fn cyclic_pair(root: &Address, path: &[Address], next: &Address, why: &str) -> RiskError {
    let chain: Vec<&str> = path
        .iter()
        .chain(std::iter::once(next))
        .map(Address::as_str)
        .collect();
    RiskError::CyclicTokenPair {
        token: root.to_string(),
        path: format!("{why}: {}", chain.join(" -> ")),
    }
}
