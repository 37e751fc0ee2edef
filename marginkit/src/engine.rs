//! Risk engine service: the registries behind a snapshot channel.
//!
//! # Architecture
//!
//! ```text
//!   writers (deployment tooling, CLI)
//!              |
//!        Mutex<()>  (one writer at a time)
//!              |
//!   clone current EngineState -> apply operation -> push MarketUpdates
//!              |                                          |
//!              v                                          v
//!   watch::Sender<Arc<EngineState>>                 MarginEngine
//!              |
//!              v
//!   readers (get_price, resolve_risk, subscribe)
//! ```
//!
//! A write that fails at any step publishes nothing, so readers only ever
//! see a complete pre- or post-update state.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

use crate::category::RiskCategoryRegistry;
use crate::config::NetworkConfig;
use crate::error::{RiskError, Result};
use crate::oracle::{OracleAggregator, PriceSource};
use crate::registry::MarketRegistry;
use crate::types::{
    Address, BaseRates, Cap, CollateralRatio, Market, MarketId, MarketListing, MarketUpdate,
    OracleAdapter, Price, PriceSourceEntry, Ratio, ResolvedRisk, RiskCategory, RiskSettings,
    SingleCollateralDebtOverride, SourceRef, TargetCollateralization, TargetLiquidationPenalty,
};

// ---------------------------------------------------------------------------
// MarginEngine
// ---------------------------------------------------------------------------

/// Boxed future returned by [`MarginEngine`] methods.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The margin protocol this engine configures.
pub trait MarginEngine: Send + Sync {
    fn base_collateralization(&self) -> EngineFuture<'_, CollateralRatio>;

    fn base_liquidation_spread(&self) -> EngineFuture<'_, Ratio>;

    /// Accept (or reject) new parameters for one market.
    fn apply_market_update(&self, update: MarketUpdate) -> EngineFuture<'_, ()>;
}

#[derive(Debug)]
struct RecordingState {
    base: BaseRates,
    updates: Vec<MarketUpdate>,
    reject_next: Option<String>,
}

/// In-memory margin engine: fixed base rates, records every update.
#[derive(Debug)]
pub struct RecordingMarginEngine {
    state: Mutex<RecordingState>,
}

impl RecordingMarginEngine {
    pub fn new(base: BaseRates) -> Self {
        Self {
            state: Mutex::new(RecordingState {
                base,
                updates: Vec::new(),
                reject_next: None,
            }),
        }
    }

    /// Change the base rates reported from now on.
    pub async fn set_base_rates(&self, base: BaseRates) {
        self.state.lock().await.base = base;
    }

    /// Reject the next `apply_market_update` call with `reason`.
    pub async fn reject_next_update(&self, reason: impl Into<String>) {
        self.state.lock().await.reject_next = Some(reason.into());
    }

    /// Every accepted update, in order.
    pub async fn updates(&self) -> Vec<MarketUpdate> {
        self.state.lock().await.updates.clone()
    }
}

impl MarginEngine for RecordingMarginEngine {
    fn base_collateralization(&self) -> EngineFuture<'_, CollateralRatio> {
        Box::pin(async move { Ok(self.state.lock().await.base.collateralization) })
    }

    fn base_liquidation_spread(&self) -> EngineFuture<'_, Ratio> {
        Box::pin(async move { Ok(self.state.lock().await.base.liquidation_spread) })
    }

    fn apply_market_update(&self, update: MarketUpdate) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Some(reason) = state.reject_next.take() {
                return Err(RiskError::MarginEngineRejected {
                    market: update.market_id.to_string(),
                    reason,
                });
            }
            state.updates.push(update);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// State and requests
// ---------------------------------------------------------------------------

/// One consistent view of every registry.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub oracle: OracleAggregator,
    pub markets: MarketRegistry,
    pub categories: RiskCategoryRegistry,
}

/// Oracle config supplied together with a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleListing {
    pub decimals: u8,
    pub sources: Vec<PriceSourceEntry>,
}

/// A complete listing, applied all-or-nothing by [`RiskEngine::list_market`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRequest {
    pub listing: MarketListing,
    /// `None` if the token already has an oracle config.
    #[serde(default)]
    pub oracle: Option<OracleListing>,
    #[serde(default)]
    pub category: RiskCategory,
    #[serde(default)]
    pub overrides: Vec<SingleCollateralDebtOverride>,
}

/// A market together with its category data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketView {
    pub market: Market,
    pub category: RiskCategory,
    pub overrides: Vec<SingleCollateralDebtOverride>,
}

struct Applied<T> {
    value: T,
    touched: Vec<MarketId>,
}

impl<T> Applied<T> {
    fn quiet(value: T) -> Self {
        Self {
            value,
            touched: Vec::new(),
        }
    }

    fn market(value: T, id: MarketId) -> Self {
        Self {
            value,
            touched: vec![id],
        }
    }
}

// ---------------------------------------------------------------------------
// RiskEngine
// ---------------------------------------------------------------------------

/// Shared handle to the oracle and market registries of one network.
pub struct RiskEngine {
    network: Arc<NetworkConfig>,
    margin: Arc<dyn MarginEngine>,
    state_tx: watch::Sender<Arc<EngineState>>,
    state_rx: watch::Receiver<Arc<EngineState>>,
    write_lock: Mutex<()>,
}

impl fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskEngine")
            .field("network", &self.network.name)
            .field("markets", &self.state_rx.borrow().markets.len())
            .finish_non_exhaustive()
    }
}

impl RiskEngine {
    pub fn new(network: Arc<NetworkConfig>, margin: Arc<dyn MarginEngine>) -> Self {
        let state = EngineState {
            oracle: OracleAggregator::for_network(&network),
            markets: MarketRegistry::new(),
            categories: RiskCategoryRegistry::new(),
        };
        let (state_tx, state_rx) = watch::channel(Arc::new(state));
        info!(network = %network.name, chain_id = network.chain_id, "risk engine created");
        Self {
            network,
            margin,
            state_tx,
            state_rx,
            write_lock: Mutex::new(()),
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Current state. Cheap; holds no lock.
    pub fn snapshot(&self) -> Arc<EngineState> {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified after every successful write.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EngineState>> {
        self.state_rx.clone()
    }

    /// Base rates as currently reported by the margin engine.
    pub async fn base_rates(&self) -> Result<BaseRates> {
        Ok(BaseRates {
            collateralization: self.margin.base_collateralization().await?,
            liquidation_spread: self.margin.base_liquidation_spread().await?,
        })
    }

    /// Apply `op` to a copy of the current state and publish it if `op` and
    /// every resulting margin engine update succeed.
    async fn mutate<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut EngineState, &BaseRates) -> Result<Applied<T>>,
    {
        let _guard = self.write_lock.lock().await;
        let base = self.base_rates().await?;
        let mut next = EngineState::clone(&self.snapshot());

        let Applied { value, touched } = f(&mut next, &base)?;

        for id in touched {
            let market = next
                .markets
                .market(id)
                .ok_or_else(|| RiskError::UnknownMarket(id.to_string()))?;
            self.margin
                .apply_market_update(MarketUpdate::from_market(market, base))
                .await?;
        }

        self.state_tx.send_replace(Arc::new(next));
        debug!(op, "engine state published");
        Ok(value)
    }

    // --- Oracle ---

    pub async fn register_source(
        &self,
        name: SourceRef,
        adapter: OracleAdapter,
        source: Arc<dyn PriceSource>,
    ) -> Result<()> {
        self.mutate("register_source", |state, _| {
            state.oracle.register_source(name, adapter, source)?;
            Ok(Applied::quiet(()))
        })
        .await
    }

    pub async fn insert_or_update_oracle_config(
        &self,
        token: &Address,
        decimals: u8,
        sources: Vec<PriceSourceEntry>,
    ) -> Result<()> {
        let token = self.network.token_by_address(token)?.clone();
        self.mutate("insert_or_update_oracle_config", |state, _| {
            state.oracle.insert_or_update_token(&token, decimals, sources)?;
            Ok(Applied::quiet(()))
        })
        .await
    }

    pub async fn get_price(&self, token: &Address) -> Result<Price> {
        let state = self.snapshot();
        state.oracle.get_price(token).await
    }

    // --- Markets ---

    /// Install the oracle config, list the market, tag its category and set
    /// its overrides as one operation.
    pub async fn list_market(&self, request: ListingRequest) -> Result<MarketId> {
        let network = Arc::clone(&self.network);
        self.mutate("list_market", move |state, base| {
            let ListingRequest {
                listing,
                oracle,
                category,
                overrides,
            } = request;
            if let Some(oracle) = oracle {
                let token = network.known_token(&listing.token)?;
                state
                    .oracle
                    .insert_or_update_token(token, oracle.decimals, oracle.sources)?;
            }
            let id = state
                .markets
                .add_market(listing, base, &state.oracle, &network)?;
            state.categories.set_category(id, category)?;
            if !overrides.is_empty() {
                state.categories.set_single_collateral_override(id, overrides)?;
            }
            Ok(Applied::market(id, id))
        })
        .await
    }

    pub async fn add_market(&self, listing: MarketListing) -> Result<MarketId> {
        let network = Arc::clone(&self.network);
        self.mutate("add_market", move |state, base| {
            let id = state
                .markets
                .add_market(listing, base, &state.oracle, &network)?;
            Ok(Applied::market(id, id))
        })
        .await
    }

    pub async fn set_supply_cap(&self, id: MarketId, cap: Cap) -> Result<()> {
        self.mutate("set_supply_cap", |state, _| {
            state.markets.set_supply_cap(id, cap)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_borrow_cap(&self, id: MarketId, cap: Cap) -> Result<()> {
        self.mutate("set_borrow_cap", |state, _| {
            state.markets.set_borrow_cap(id, cap)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_supply_cap_ui(&self, token: &Address, amount: Decimal) -> Result<()> {
        self.mutate("set_supply_cap_ui", |state, _| {
            let id = state.markets.set_supply_cap_ui(token, amount)?.id;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_borrow_cap_ui(&self, token: &Address, amount: Decimal) -> Result<()> {
        self.mutate("set_borrow_cap_ui", |state, _| {
            let id = state.markets.set_borrow_cap_ui(token, amount)?.id;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_is_collateral_only(&self, id: MarketId, value: bool) -> Result<()> {
        self.mutate("set_is_collateral_only", |state, _| {
            state.markets.set_is_collateral_only(id, value)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_is_borrow_only(&self, id: MarketId, value: bool) -> Result<()> {
        self.mutate("set_is_borrow_only", |state, _| {
            state.markets.set_is_borrow_only(id, value)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_min_collateralization(
        &self,
        id: MarketId,
        target: TargetCollateralization,
    ) -> Result<()> {
        self.mutate("set_min_collateralization", |state, base| {
            state.markets.set_min_collateralization(id, target, base)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    pub async fn set_liquidation_penalty(
        &self,
        id: MarketId,
        target: TargetLiquidationPenalty,
    ) -> Result<()> {
        self.mutate("set_liquidation_penalty", |state, base| {
            state.markets.set_liquidation_penalty(id, target, base)?;
            Ok(Applied::market((), id))
        })
        .await
    }

    // --- Categories ---

    pub async fn set_category(&self, id: MarketId, category: RiskCategory) -> Result<()> {
        self.mutate("set_category", |state, _| {
            if state.markets.market(id).is_none() {
                return Err(RiskError::UnknownMarket(id.to_string()));
            }
            state.categories.set_category(id, category)?;
            Ok(Applied::quiet(()))
        })
        .await
    }

    /// Returns every market whose risk now follows the new settings.
    pub async fn set_category_settings(
        &self,
        category: RiskCategory,
        settings: RiskSettings,
    ) -> Result<Vec<MarketId>> {
        self.mutate("set_category_settings", |state, _| {
            let affected = state.categories.set_category_settings(category, settings)?;
            Ok(Applied::quiet(affected))
        })
        .await
    }

    pub async fn set_single_collateral_override(
        &self,
        id: MarketId,
        overrides: Vec<SingleCollateralDebtOverride>,
    ) -> Result<()> {
        self.mutate("set_single_collateral_override", |state, _| {
            if state.markets.market(id).is_none() {
                return Err(RiskError::UnknownMarket(id.to_string()));
            }
            state.categories.set_single_collateral_override(id, overrides)?;
            Ok(Applied::quiet(()))
        })
        .await
    }

    // --- Reads ---

    /// Effective risk settings for `collateral` against a position whose debt
    /// is drawn from `debt_markets`, using the live base rates.
    pub async fn resolve_risk(
        &self,
        collateral: MarketId,
        debt_markets: &BTreeSet<MarketId>,
    ) -> Result<ResolvedRisk> {
        let base = self.base_rates().await?;
        let state = self.snapshot();
        let market = state
            .markets
            .market(collateral)
            .ok_or_else(|| RiskError::UnknownMarket(collateral.to_string()))?;
        state.categories.resolve(market, debt_markets, &base)
    }

    pub fn market_view(&self, id: MarketId) -> Result<MarketView> {
        let state = self.snapshot();
        let market = state
            .markets
            .market(id)
            .ok_or_else(|| RiskError::UnknownMarket(id.to_string()))?;
        Ok(MarketView {
            market: market.clone(),
            category: state.categories.category_of(id),
            overrides: state.categories.single_collateral_overrides(id).to_vec(),
        })
    }

    /// Every market with its category data, in id order.
    pub fn market_views(&self) -> Vec<MarketView> {
        let state = self.snapshot();
        state
            .markets
            .markets()
            .iter()
            .map(|market| MarketView {
                market: market.clone(),
                category: state.categories.category_of(market.id),
                overrides: state.categories.single_collateral_overrides(market.id).to_vec(),
            })
            .collect()
    }
}
