use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{CollateralRatio, MarketId, Ratio};

/// E-mode risk category. A market carries at most one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskCategory {
    #[default]
    None,
    Bera,
    Btc,
    Eth,
    Stable,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "NONE",
            Self::Bera => "BERA",
            Self::Btc => "BTC",
            Self::Eth => "ETH",
            Self::Stable => "STABLE",
        };
        f.write_str(s)
    }
}

/// Margin ratio and liquidation reward applied instead of a market's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSettings {
    pub margin_ratio: CollateralRatio,
    pub liquidation_reward: Ratio,
}

/// Favorable terms for a collateral market, granted only when every debt
/// market of the position is in `debt_market_ids`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleCollateralDebtOverride {
    pub debt_market_ids: BTreeSet<MarketId>,
    #[serde(flatten)]
    pub settings: RiskSettings,
}

/// Which rule produced a [`ResolvedRisk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RiskSource {
    /// Index into the market's override list.
    DebtOverride { index: usize },
    Category { category: RiskCategory },
    Market,
}

/// Effective risk parameters for a collateral market and a debt set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRisk {
    pub source: RiskSource,
    pub settings: RiskSettings,
}
