//! E-mode risk categories and single-collateral debt overrides.
//!
//! Resolution for a collateral market and a position's debt set:
//!
//! 1. the first override, in list order, whose debt markets cover the debt set;
//! 2. the market's category settings, if it is tagged and the category is configured;
//! 3. the market's own premiums applied to the protocol base rates.
//!
//! Overrides are not ranked by specificity. Callers order them from most to
//! least specific.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use crate::error::{RiskError, Result};
use crate::premium::{effective_collateralization, effective_liquidation_penalty};
use crate::types::{
    BaseRates, Market, MarketId, ResolvedRisk, RiskCategory, RiskSettings, RiskSource,
    SingleCollateralDebtOverride,
};

#[derive(Debug, Clone, Default)]
pub struct RiskCategoryRegistry {
    tags: BTreeMap<MarketId, RiskCategory>,
    settings: BTreeMap<RiskCategory, RiskSettings>,
    overrides: BTreeMap<MarketId, Vec<SingleCollateralDebtOverride>>,
}

impl RiskCategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `market` with `category`. `RiskCategory::None` clears the tag.
    ///
    /// # Errors
    ///
    /// Returns `RiskError::DuplicateCategoryAssignment` if the market already
    /// carries a different category.
    pub fn set_category(&mut self, market: MarketId, category: RiskCategory) -> Result<()> {
        let existing = self.category_of(market);
        if category == RiskCategory::None {
            if self.tags.remove(&market).is_some() {
                info!(%market, previous = %existing, "risk category cleared");
            }
            return Ok(());
        }
        if existing != RiskCategory::None && existing != category {
            return Err(RiskError::DuplicateCategoryAssignment {
                market: market.to_string(),
                existing: existing.to_string(),
                requested: category.to_string(),
            });
        }
        self.tags.insert(market, category);
        info!(%market, %category, "risk category set");
        Ok(())
    }

    pub fn category_of(&self, market: MarketId) -> RiskCategory {
        self.tags.get(&market).copied().unwrap_or_default()
    }

    /// Set the shared settings of `category` and return every market tagged
    /// with it, all of which now resolve to the new settings.
    ///
    /// # Errors
    ///
    /// Returns `RiskError::InvalidAmount` for `RiskCategory::None`.
    pub fn set_category_settings(
        &mut self,
        category: RiskCategory,
        settings: RiskSettings,
    ) -> Result<Vec<MarketId>> {
        if category == RiskCategory::None {
            return Err(RiskError::InvalidAmount(
                "category NONE cannot carry settings".into(),
            ));
        }
        let previous = self.settings.insert(category, settings);
        let affected = self.markets_in_category(category);
        if previous != Some(settings) && !affected.is_empty() {
            warn!(
                %category,
                margin_ratio = %settings.margin_ratio,
                liquidation_reward = %settings.liquidation_reward,
                markets = ?affected,
                "category settings changed for every tagged market"
            );
        } else {
            info!(%category, "category settings set");
        }
        Ok(affected)
    }

    pub fn category_settings(&self, category: RiskCategory) -> Option<&RiskSettings> {
        self.settings.get(&category)
    }

    /// Markets tagged with `category`, in id order.
    pub fn markets_in_category(&self, category: RiskCategory) -> Vec<MarketId> {
        self.tags
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(m, _)| *m)
            .collect()
    }

    /// Replace the ordered override list of collateral market `market`.
    /// An empty list removes all overrides.
    pub fn set_single_collateral_override(
        &mut self,
        market: MarketId,
        overrides: Vec<SingleCollateralDebtOverride>,
    ) -> Result<()> {
        for (index, o) in overrides.iter().enumerate() {
            if o.debt_market_ids.is_empty() {
                return Err(RiskError::InvalidAmount(format!(
                    "override {index} for market {market} has no debt markets"
                )));
            }
            if o.debt_market_ids.contains(&market) {
                return Err(RiskError::InvalidAmount(format!(
                    "override {index} for market {market} lists the collateral market as debt"
                )));
            }
        }
        info!(%market, overrides = overrides.len(), "single-collateral overrides set");
        if overrides.is_empty() {
            self.overrides.remove(&market);
        } else {
            self.overrides.insert(market, overrides);
        }
        Ok(())
    }

    pub fn single_collateral_overrides(&self, market: MarketId) -> &[SingleCollateralDebtOverride] {
        self.overrides.get(&market).map_or(&[], Vec::as_slice)
    }

    /// Effective risk settings for `market` used as collateral against
    /// `debt_markets`.
    pub fn resolve(
        &self,
        market: &Market,
        debt_markets: &BTreeSet<MarketId>,
        base: &BaseRates,
    ) -> Result<ResolvedRisk> {
        if !debt_markets.is_empty() {
            let hit = self
                .single_collateral_overrides(market.id)
                .iter()
                .enumerate()
                .find(|(_, o)| debt_markets.is_subset(&o.debt_market_ids));
            if let Some((index, o)) = hit {
                return Ok(ResolvedRisk {
                    source: RiskSource::DebtOverride { index },
                    settings: o.settings,
                });
            }
        }

        let category = self.category_of(market.id);
        if let Some(settings) = self.settings.get(&category) {
            return Ok(ResolvedRisk {
                source: RiskSource::Category { category },
                settings: *settings,
            });
        }

        Ok(ResolvedRisk {
            source: RiskSource::Market,
            settings: RiskSettings {
                margin_ratio: effective_collateralization(
                    &base.collateralization,
                    market.margin_premium,
                )?,
                liquidation_reward: effective_liquidation_penalty(
                    &base.liquidation_spread,
                    market.liquidation_premium,
                )?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Address, Cap, InterestSetterRef, Premium, TargetCollateralization,
        TargetLiquidationPenalty, Token,
    };
    use rust_decimal_macros::dec;

    fn market(id: u32) -> Market {
        let address = Address::parse(&format!("0x{}", hex::encode([id as u8 + 1; 20]))).unwrap();
        Market {
            id: MarketId(id),
            token: Token::new(address.clone(), format!("M{id}"), 18),
            oracle_config: address,
            interest_setter: InterestSetterRef("Setter".into()),
            min_collateralization: TargetCollateralization::Base,
            margin_premium: Premium::new(dec!(0.1)).unwrap(),
            liquidation_penalty: TargetLiquidationPenalty::Base,
            liquidation_premium: Premium::new(dec!(0.2)).unwrap(),
            supply_cap: Cap::Unlimited,
            borrow_cap: Cap::Unlimited,
            is_collateral_only: false,
            is_borrow_only: false,
        }
    }

    fn base() -> BaseRates {
        BaseRates {
            collateralization: "115%".parse().unwrap(),
            liquidation_spread: "5%".parse().unwrap(),
        }
    }

    fn settings(margin: &str, reward: &str) -> RiskSettings {
        RiskSettings {
            margin_ratio: margin.parse().unwrap(),
            liquidation_reward: reward.parse().unwrap(),
        }
    }

    fn ids(v: &[u32]) -> BTreeSet<MarketId> {
        v.iter().copied().map(MarketId).collect()
    }

    #[test]
    fn test_retag_same_category_is_idempotent() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_category(MarketId(0), RiskCategory::Eth).unwrap();
        reg.set_category(MarketId(0), RiskCategory::Eth).unwrap();
        assert_eq!(reg.category_of(MarketId(0)), RiskCategory::Eth);
    }

    #[test]
    fn test_retag_different_category_rejected() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_category(MarketId(0), RiskCategory::Eth).unwrap();
        let err = reg.set_category(MarketId(0), RiskCategory::Btc).unwrap_err();
        assert!(matches!(err, RiskError::DuplicateCategoryAssignment { .. }));

        reg.set_category(MarketId(0), RiskCategory::None).unwrap();
        reg.set_category(MarketId(0), RiskCategory::Btc).unwrap();
        assert_eq!(reg.category_of(MarketId(0)), RiskCategory::Btc);
    }

    #[test]
    fn test_none_category_cannot_carry_settings() {
        let mut reg = RiskCategoryRegistry::new();
        assert!(matches!(
            reg.set_category_settings(RiskCategory::None, settings("110%", "4%"))
                .unwrap_err(),
            RiskError::InvalidAmount(_)
        ));
    }

    #[test]
    fn test_category_settings_blast_radius() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_category(MarketId(0), RiskCategory::Stable).unwrap();
        reg.set_category(MarketId(3), RiskCategory::Stable).unwrap();
        reg.set_category(MarketId(1), RiskCategory::Eth).unwrap();

        let affected = reg
            .set_category_settings(RiskCategory::Stable, settings("105%", "2%"))
            .unwrap();
        assert_eq!(affected, vec![MarketId(0), MarketId(3)]);

        for id in [0, 3] {
            let r = reg.resolve(&market(id), &ids(&[]), &base()).unwrap();
            assert_eq!(r.settings, settings("105%", "2%"));
        }
        let untouched = reg.resolve(&market(1), &ids(&[]), &base()).unwrap();
        assert_eq!(untouched.source, RiskSource::Market);
    }

    #[test]
    fn test_override_takes_precedence_over_category() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_category(MarketId(0), RiskCategory::Eth).unwrap();
        reg.set_category_settings(RiskCategory::Eth, settings("120%", "5%"))
            .unwrap();
        reg.set_single_collateral_override(
            MarketId(0),
            vec![SingleCollateralDebtOverride {
                debt_market_ids: ids(&[1, 2]),
                settings: settings("105%", "3%"),
            }],
        )
        .unwrap();

        let r = reg.resolve(&market(0), &ids(&[2]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::DebtOverride { index: 0 });
        assert_eq!(r.settings, settings("105%", "3%"));

        // Debt outside the override's set falls back to the category.
        let r = reg.resolve(&market(0), &ids(&[2, 5]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::Category { category: RiskCategory::Eth });
    }

    #[test]
    fn test_first_matching_override_wins() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_single_collateral_override(
            MarketId(0),
            vec![
                SingleCollateralDebtOverride {
                    debt_market_ids: ids(&[1, 2, 3]),
                    settings: settings("110%", "4%"),
                },
                SingleCollateralDebtOverride {
                    debt_market_ids: ids(&[1]),
                    settings: settings("102%", "1%"),
                },
            ],
        )
        .unwrap();
        let r = reg.resolve(&market(0), &ids(&[1]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::DebtOverride { index: 0 });
    }

    #[test]
    fn test_empty_debt_set_never_matches_override() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_single_collateral_override(
            MarketId(0),
            vec![SingleCollateralDebtOverride {
                debt_market_ids: ids(&[1]),
                settings: settings("102%", "1%"),
            }],
        )
        .unwrap();
        let r = reg.resolve(&market(0), &ids(&[]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::Market);
    }

    #[test]
    fn test_override_validation() {
        let mut reg = RiskCategoryRegistry::new();
        let empty = SingleCollateralDebtOverride {
            debt_market_ids: BTreeSet::new(),
            settings: settings("102%", "1%"),
        };
        assert!(reg
            .set_single_collateral_override(MarketId(0), vec![empty])
            .is_err());

        let self_debt = SingleCollateralDebtOverride {
            debt_market_ids: ids(&[0, 1]),
            settings: settings("102%", "1%"),
        };
        assert!(reg
            .set_single_collateral_override(MarketId(0), vec![self_debt])
            .is_err());
        assert!(reg.single_collateral_overrides(MarketId(0)).is_empty());
    }

    #[test]
    fn test_market_fallback_applies_premiums_to_base() {
        let reg = RiskCategoryRegistry::new();
        let r = reg.resolve(&market(0), &ids(&[1]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::Market);
        // 1.15 * 1.1 and 0.05 * 1.2
        assert_eq!(r.settings.margin_ratio.value(), dec!(1.265));
        assert_eq!(r.settings.liquidation_reward.value(), dec!(0.06));
    }

    #[test]
    fn test_tagged_but_unconfigured_category_falls_through() {
        let mut reg = RiskCategoryRegistry::new();
        reg.set_category(MarketId(0), RiskCategory::Btc).unwrap();
        let r = reg.resolve(&market(0), &ids(&[]), &base()).unwrap();
        assert_eq!(r.source, RiskSource::Market);
    }
}
