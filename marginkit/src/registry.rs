//! Market registry: the aggregate root for listed markets.
//!
//! Markets are never removed. They are soft-disabled with zero caps or the
//! borrow-only flag.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::info;

use crate::config::NetworkConfig;
use crate::decimals::ui_to_base_units;
use crate::error::{RiskError, Result};
use crate::oracle::OracleAggregator;
use crate::premium::{liquidation_premium, margin_premium};
use crate::types::{
    Address, BaseRates, Cap, Market, MarketId, MarketListing, TargetCollateralization,
    TargetLiquidationPenalty,
};

#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    markets: Vec<Market>,
    by_token: HashMap<Address, MarketId>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// List a new market and return its id.
    ///
    /// The token must already have an oracle config and the interest setter
    /// must exist in the network address book. Premiums are computed against
    /// `base` as passed in.
    pub fn add_market(
        &mut self,
        listing: MarketListing,
        base: &BaseRates,
        oracle: &OracleAggregator,
        network: &NetworkConfig,
    ) -> Result<MarketId> {
        if !oracle.has_config(&listing.token.address) {
            return Err(RiskError::UnknownOracleConfig(listing.token.to_string()));
        }
        let token = network.known_token(&listing.token)?;
        if let Some(existing) = self.by_token.get(&token.address) {
            return Err(RiskError::MarketAlreadyListed {
                token: token.to_string(),
                market: existing.to_string(),
            });
        }
        for (name, cap) in [("supply", listing.supply_cap), ("borrow", listing.borrow_cap)] {
            if cap.is_zero() {
                return Err(RiskError::InvalidAmount(format!(
                    "{token}: {name} cap of zero at listing"
                )));
            }
        }
        network.contract(&listing.interest_setter.0)?;

        let margin_premium = margin_premium(&base.collateralization, listing.min_collateralization)?;
        let liquidation_premium =
            liquidation_premium(&base.liquidation_spread, listing.liquidation_penalty)?;

        let id = MarketId(u32::try_from(self.markets.len()).map_err(|_| {
            RiskError::MathOverflow("market id space exhausted".into())
        })?);
        let market = Market {
            id,
            oracle_config: token.address.clone(),
            token: token.clone(),
            interest_setter: listing.interest_setter,
            min_collateralization: listing.min_collateralization,
            margin_premium,
            liquidation_penalty: listing.liquidation_penalty,
            liquidation_premium,
            supply_cap: listing.supply_cap,
            borrow_cap: listing.borrow_cap,
            is_collateral_only: listing.is_collateral_only,
            is_borrow_only: false,
        };

        info!(
            market = %id,
            token = %market.token,
            margin_premium = %margin_premium,
            liquidation_premium = %liquidation_premium,
            supply_cap = %market.supply_cap,
            borrow_cap = %market.borrow_cap,
            "market listed"
        );
        self.by_token.insert(market.token.address.clone(), id);
        self.markets.push(market);
        Ok(id)
    }

    pub fn market(&self, id: MarketId) -> Option<&Market> {
        self.markets.get(id.0 as usize)
    }

    pub fn market_by_token(&self, token: &Address) -> Option<&Market> {
        self.by_token.get(token).and_then(|id| self.market(*id))
    }

    /// All markets in id order.
    pub fn markets(&self) -> &[Market] {
        &self.markets
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    fn market_mut(&mut self, id: MarketId) -> Result<&mut Market> {
        self.markets
            .get_mut(id.0 as usize)
            .ok_or_else(|| RiskError::UnknownMarket(id.to_string()))
    }

    fn id_for_token(&self, token: &Address) -> Result<MarketId> {
        self.by_token
            .get(token)
            .copied()
            .ok_or_else(|| RiskError::UnknownMarket(token.to_string()))
    }

    // --- Setters ---

    pub fn set_supply_cap(&mut self, id: MarketId, cap: Cap) -> Result<&Market> {
        let market = self.market_mut(id)?;
        market.supply_cap = cap;
        info!(market = %id, %cap, "supply cap set");
        Ok(market)
    }

    pub fn set_borrow_cap(&mut self, id: MarketId, cap: Cap) -> Result<&Market> {
        let market = self.market_mut(id)?;
        market.borrow_cap = cap;
        info!(market = %id, %cap, "borrow cap set");
        Ok(market)
    }

    /// Set the supply cap of `token`'s market in whole-token units.
    pub fn set_supply_cap_ui(&mut self, token: &Address, amount: Decimal) -> Result<&Market> {
        let (id, cap) = self.ui_cap(token, amount)?;
        self.set_supply_cap(id, cap)
    }

    /// Set the borrow cap of `token`'s market in whole-token units.
    pub fn set_borrow_cap_ui(&mut self, token: &Address, amount: Decimal) -> Result<&Market> {
        let (id, cap) = self.ui_cap(token, amount)?;
        self.set_borrow_cap(id, cap)
    }

    fn ui_cap(&self, token: &Address, amount: Decimal) -> Result<(MarketId, Cap)> {
        let id = self.id_for_token(token)?;
        let decimals = self.markets[id.0 as usize].token.decimals;
        Ok((id, Cap::Limited(ui_to_base_units(amount, decimals)?)))
    }

    pub fn set_is_collateral_only(&mut self, id: MarketId, value: bool) -> Result<&Market> {
        let market = self.market_mut(id)?;
        market.is_collateral_only = value;
        info!(market = %id, value, "collateral-only flag set");
        Ok(market)
    }

    pub fn set_is_borrow_only(&mut self, id: MarketId, value: bool) -> Result<&Market> {
        let market = self.market_mut(id)?;
        market.is_borrow_only = value;
        info!(market = %id, value, "borrow-only flag set");
        Ok(market)
    }

    /// Retarget a market's collateralization, recomputing its premium
    /// against the supplied base.
    pub fn set_min_collateralization(
        &mut self,
        id: MarketId,
        target: TargetCollateralization,
        base: &BaseRates,
    ) -> Result<&Market> {
        let premium = margin_premium(&base.collateralization, target)?;
        let market = self.market_mut(id)?;
        market.min_collateralization = target;
        market.margin_premium = premium;
        info!(market = %id, %target, %premium, "min collateralization set");
        Ok(market)
    }

    pub fn set_liquidation_penalty(
        &mut self,
        id: MarketId,
        target: TargetLiquidationPenalty,
        base: &BaseRates,
    ) -> Result<&Market> {
        let premium = liquidation_premium(&base.liquidation_spread, target)?;
        let market = self.market_mut(id)?;
        market.liquidation_penalty = target;
        market.liquidation_premium = premium;
        info!(market = %id, %target, %premium, "liquidation penalty set");
        Ok(market)
    }
}
