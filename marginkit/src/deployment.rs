//! Declarative deployment plans.
//!
//! A plan names tokens and markets by symbol and is applied against a
//! [`RiskEngine`] in a fixed order: price sources, oracle configs, category
//! settings, market listings, then single-collateral overrides (which may
//! reference any market listed by the same plan).

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NetworkConfig;
use crate::decimals::{to_scaled_u128, ui_to_base_units};
use crate::engine::{ListingRequest, RiskEngine};
use crate::error::{RiskError, Result};
use crate::oracle::{PriceSource, QuoteFileSource, StaticPriceSource};
use crate::types::{
    Cap, InterestSetterRef, MarketId, MarketListing, OracleAdapter, PriceSourceEntry,
    RiskCategory, RiskSettings, SingleCollateralDebtOverride, SourceRef,
    TargetCollateralization, TargetLiquidationPenalty, Token,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPlan {
    #[serde(default)]
    pub sources: Vec<SourcePlan>,
    #[serde(default)]
    pub category_settings: Vec<CategoryPlan>,
    #[serde(default)]
    pub oracles: Vec<OraclePlan>,
    #[serde(default)]
    pub markets: Vec<MarketPlan>,
}

/// A price source to register. Only in-tree adapters can be built from a
/// plan: `STATIC` (fixed USD prices by symbol) and `FILE` (a quote file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePlan {
    pub name: String,
    pub adapter: OracleAdapter,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub prices: BTreeMap<String, Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPlan {
    pub category: RiskCategory,
    #[serde(flatten)]
    pub settings: RiskSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleSourcePlan {
    pub source: String,
    /// Symbol of the pair token, if the source quotes in another token.
    #[serde(default)]
    pub pair: Option<String>,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OraclePlan {
    pub token: String,
    /// Defaults to the token's oracle decimals.
    #[serde(default)]
    pub decimals: Option<u8>,
    pub sources: Vec<OracleSourcePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridePlan {
    /// Symbols of the debt markets.
    pub debt_markets: Vec<String>,
    #[serde(flatten)]
    pub settings: RiskSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPlan {
    pub token: String,
    pub interest_setter: String,
    pub min_collateralization: TargetCollateralization,
    pub liquidation_penalty: TargetLiquidationPenalty,
    /// Whole-token units; absent means unlimited.
    #[serde(default)]
    pub supply_cap: Option<Decimal>,
    #[serde(default)]
    pub borrow_cap: Option<Decimal>,
    #[serde(default)]
    pub is_collateral_only: bool,
    #[serde(default)]
    pub is_borrow_only: bool,
    #[serde(default)]
    pub category: RiskCategory,
    #[serde(default)]
    pub overrides: Vec<OverridePlan>,
}

impl DeploymentPlan {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a plan from disk. Relative `FILE` source paths are resolved
    /// against the plan's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut plan = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            for source in &mut plan.sources {
                if let Some(p) = source.path.as_mut().filter(|p| p.is_relative()) {
                    *p = dir.join(&*p);
                }
            }
        }
        Ok(plan)
    }

    /// Apply every step of the plan and return the ids of the listed markets.
    ///
    /// Steps run in order and each is atomic on its own; a failure stops the
    /// plan with earlier steps already applied.
    pub async fn apply(&self, engine: &RiskEngine, network: &NetworkConfig) -> Result<Vec<MarketId>> {
        for plan in &self.sources {
            let source = build_source(plan, network)?;
            engine
                .register_source(SourceRef::new(&plan.name), plan.adapter, source)
                .await?;
        }

        for plan in &self.oracles {
            let token = network.token(&plan.token)?;
            let sources = oracle_entries(&plan.sources, network)?;
            let decimals = plan.decimals.unwrap_or_else(|| token.oracle_decimals());
            engine
                .insert_or_update_oracle_config(&token.address, decimals, sources)
                .await?;
        }

        for plan in &self.category_settings {
            engine
                .set_category_settings(plan.category, plan.settings)
                .await?;
        }

        let mut listed = Vec::with_capacity(self.markets.len());
        for plan in &self.markets {
            let token = network.token(&plan.token)?;
            let listing = MarketListing {
                token: token.clone(),
                interest_setter: InterestSetterRef(plan.interest_setter.clone()),
                min_collateralization: plan.min_collateralization,
                liquidation_penalty: plan.liquidation_penalty,
                supply_cap: ui_cap(token, plan.supply_cap)?,
                borrow_cap: ui_cap(token, plan.borrow_cap)?,
                is_collateral_only: plan.is_collateral_only,
            };
            let id = engine
                .list_market(ListingRequest {
                    listing,
                    oracle: None,
                    category: plan.category,
                    overrides: Vec::new(),
                })
                .await?;
            if plan.is_borrow_only {
                engine.set_is_borrow_only(id, true).await?;
            }
            listed.push(id);
        }

        for (plan, id) in self.markets.iter().zip(&listed) {
            if plan.overrides.is_empty() {
                continue;
            }
            let snapshot = engine.snapshot();
            let mut overrides = Vec::with_capacity(plan.overrides.len());
            for o in &plan.overrides {
                let mut debt_market_ids = BTreeSet::new();
                for symbol in &o.debt_markets {
                    let token = network.token(symbol)?;
                    let market = snapshot
                        .markets
                        .market_by_token(&token.address)
                        .ok_or_else(|| RiskError::UnknownMarket(token.to_string()))?;
                    debt_market_ids.insert(market.id);
                }
                overrides.push(SingleCollateralDebtOverride {
                    debt_market_ids,
                    settings: o.settings,
                });
            }
            engine.set_single_collateral_override(*id, overrides).await?;
        }

        info!(
            network = %network.name,
            sources = self.sources.len(),
            oracles = self.oracles.len(),
            markets = listed.len(),
            "deployment plan applied"
        );
        Ok(listed)
    }
}

fn build_source(plan: &SourcePlan, network: &NetworkConfig) -> Result<Arc<dyn PriceSource>> {
    match plan.adapter {
        OracleAdapter::Static => {
            let mut source = StaticPriceSource::new();
            for (symbol, price) in &plan.prices {
                let token = network.token(symbol)?;
                let decimals = price.scale();
                let value = to_scaled_u128(*price, decimals)?;
                // Decimal scale never exceeds 28.
                source = source.with_quote(token.address.clone(), value, decimals as u8);
            }
            Ok(Arc::new(source))
        }
        OracleAdapter::File => {
            let path = plan.path.as_ref().ok_or_else(|| {
                RiskError::Config(format!("source {}: FILE adapter needs a path", plan.name))
            })?;
            Ok(Arc::new(QuoteFileSource::new(path.clone())))
        }
        other => Err(RiskError::UnsupportedAdapter {
            source_ref: plan.name.clone(),
            adapter: other.to_string(),
        }),
    }
}

fn oracle_entries(
    sources: &[OracleSourcePlan],
    network: &NetworkConfig,
) -> Result<Vec<PriceSourceEntry>> {
    sources
        .iter()
        .map(|s| {
            Ok(match &s.pair {
                Some(symbol) => {
                    PriceSourceEntry::paired(&s.source, network.token(symbol)?.address.clone(), s.weight)
                }
                None => PriceSourceEntry::usd(&s.source, s.weight),
            })
        })
        .collect()
}

fn ui_cap(token: &Token, amount: Option<Decimal>) -> Result<Cap> {
    match amount {
        None => Ok(Cap::Unlimited),
        Some(amount) => Ok(Cap::Limited(ui_to_base_units(amount, token.decimals)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_defaults() {
        let plan = DeploymentPlan::from_json(
            r#"{"markets":[{
                "token":"WETH",
                "interestSetter":"Setter",
                "minCollateralization":"base",
                "liquidationPenalty":"6%"
            }]}"#,
        )
        .unwrap();
        assert!(plan.sources.is_empty());
        let m = &plan.markets[0];
        assert_eq!(m.category, RiskCategory::None);
        assert_eq!(m.supply_cap, None);
        assert_eq!(m.min_collateralization, TargetCollateralization::Base);
    }

    #[test]
    fn test_load_resolves_file_paths_against_plan_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"sources":[{"name":"feed","adapter":"FILE","path":"quotes.json"}]}"#,
        )
        .unwrap();
        let plan = DeploymentPlan::load(&path).unwrap();
        assert_eq!(
            plan.sources[0].path.as_deref(),
            Some(dir.path().join("quotes.json").as_path())
        );
    }
}
