//! Price source contract and the in-tree adapters.
//!
//! Concrete upstream adapters (Chainlink, Chronicle, Redstone, ...) live
//! outside this crate; they only need to implement [`PriceSource`].

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::debug;

use crate::error::{RiskError, Result};
use crate::types::{Address, SourceQuote};
use crate::utils::now_unix_secs;

/// Boxed future returned by [`PriceSource::get_price`].
pub type QuoteFuture<'a> = Pin<Box<dyn Future<Output = Result<SourceQuote>> + Send + 'a>>;

/// Anything that can quote a token's price.
pub trait PriceSource: Send + Sync {
    fn get_price<'a>(&'a self, token: &'a Address) -> QuoteFuture<'a>;
}

// ---------------------------------------------------------------------------
// StaticPriceSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct StaticQuote {
    value: u128,
    decimals: u8,
    /// `None` means "always fresh".
    as_of: Option<u64>,
}

/// Fixed quotes, stamped with the current time unless pinned.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceSource {
    quotes: HashMap<Address, StaticQuote>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(mut self, token: Address, value: u128, decimals: u8) -> Self {
        self.quotes.insert(
            token,
            StaticQuote {
                value,
                decimals,
                as_of: None,
            },
        );
        self
    }

    /// Quote pinned to a fixed timestamp (useful for staleness checks).
    pub fn with_quote_at(
        mut self,
        token: Address,
        value: u128,
        decimals: u8,
        as_of: u64,
    ) -> Self {
        self.quotes.insert(
            token,
            StaticQuote {
                value,
                decimals,
                as_of: Some(as_of),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

impl PriceSource for StaticPriceSource {
    fn get_price<'a>(&'a self, token: &'a Address) -> QuoteFuture<'a> {
        Box::pin(async move {
            let q = self
                .quotes
                .get(token)
                .ok_or_else(|| RiskError::UnknownToken(token.to_string()))?;
            Ok(SourceQuote {
                value: q.value,
                decimals: q.decimals,
                as_of: q.as_of.unwrap_or_else(now_unix_secs),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// QuoteFileSource
// ---------------------------------------------------------------------------

/// Reads a JSON map of `address -> {value, decimals, asOf}` on every fetch,
/// so an external process can keep the file current.
#[derive(Debug, Clone)]
pub struct QuoteFileSource {
    path: PathBuf,
}

impl QuoteFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PriceSource for QuoteFileSource {
    fn get_price<'a>(&'a self, token: &'a Address) -> QuoteFuture<'a> {
        Box::pin(async move {
            let raw = tokio::fs::read_to_string(&self.path).await?;
            let quotes: HashMap<Address, SourceQuote> = serde_json::from_str(&raw)?;
            debug!(path = %self.path.display(), quotes = quotes.len(), "quote file read");
            quotes
                .get(token)
                .copied()
                .ok_or_else(|| RiskError::UnknownToken(token.to_string()))
        })
    }
}
