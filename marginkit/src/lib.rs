pub mod category;
pub mod config;
pub mod decimals;
pub mod deployment;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod premium;
pub mod registry;
pub mod types;
pub mod utils;

// ---- Top-level re-exports for ergonomic usage ----

// Engine + registries
pub use category::RiskCategoryRegistry;
pub use config::{NetworkConfig, OracleSettings};
pub use engine::{
    EngineState, ListingRequest, MarginEngine, MarketView, OracleListing, RecordingMarginEngine,
    RiskEngine,
};
pub use error::{Result, RiskError};
pub use registry::MarketRegistry;

// Oracle
pub use oracle::{OracleAggregator, PriceSource, QuoteFileSource, StaticPriceSource};

// Deployment plans
pub use deployment::DeploymentPlan;

// Premiums
pub use premium::{liquidation_premium, margin_premium};

// Core types
pub use types::{
    Address, AggregatedPriceConfig, BaseRates, Cap, CollateralRatio, InterestSetterRef, Market,
    MarketId, MarketListing, MarketUpdate, OracleAdapter, Premium, Price, PriceSourceEntry, Ratio,
    ResolvedRisk, RiskCategory, RiskSettings, RiskSource, SingleCollateralDebtOverride,
    SourceQuote, SourceRef, TargetCollateralization, TargetLiquidationPenalty, Token,
};
