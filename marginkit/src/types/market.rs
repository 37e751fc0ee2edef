use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{
    Address, BaseRates, Premium, TargetCollateralization, TargetLiquidationPenalty, Token,
};

/// Sequential market identifier assigned at listing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub u32);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Supply or borrow cap in token base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cap {
    Unlimited,
    Limited(u128),
}

impl Cap {
    pub fn is_zero(&self) -> bool {
        matches!(self, Cap::Limited(0))
    }
}

impl fmt::Display for Cap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cap::Unlimited => f.write_str("unlimited"),
            Cap::Limited(v) => write!(f, "{v}"),
        }
    }
}

/// Name of the interest setter contract in the network address book.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterestSetterRef(pub String);

impl fmt::Display for InterestSetterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A listed market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub id: MarketId,
    pub token: Token,
    /// Token whose aggregated oracle config prices this market.
    pub oracle_config: Address,
    pub interest_setter: InterestSetterRef,
    pub min_collateralization: TargetCollateralization,
    pub margin_premium: Premium,
    pub liquidation_penalty: TargetLiquidationPenalty,
    pub liquidation_premium: Premium,
    pub supply_cap: Cap,
    pub borrow_cap: Cap,
    pub is_collateral_only: bool,
    pub is_borrow_only: bool,
}

/// Everything needed to list a new market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketListing {
    pub token: Token,
    pub interest_setter: InterestSetterRef,
    pub min_collateralization: TargetCollateralization,
    pub liquidation_penalty: TargetLiquidationPenalty,
    pub supply_cap: Cap,
    pub borrow_cap: Cap,
    #[serde(default)]
    pub is_collateral_only: bool,
}

/// Record pushed to the margin engine whenever a market's parameters change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    pub market_id: MarketId,
    pub token: Address,
    pub margin_premium: Premium,
    pub liquidation_premium: Premium,
    pub supply_cap: Cap,
    pub borrow_cap: Cap,
    pub is_collateral_only: bool,
    pub is_borrow_only: bool,
    /// Base rates the premiums were computed against.
    pub base_rates: BaseRates,
}

impl MarketUpdate {
    pub fn from_market(market: &Market, base_rates: BaseRates) -> Self {
        Self {
            market_id: market.id,
            token: market.token.address.clone(),
            margin_premium: market.margin_premium,
            liquidation_premium: market.liquidation_premium,
            supply_cap: market.supply_cap,
            borrow_cap: market.borrow_cap,
            is_collateral_only: market.is_collateral_only,
            is_borrow_only: market.is_borrow_only,
            base_rates,
        }
    }
}
