use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("invalid weights for {token}: {reason}")]
    InvalidWeight { token: String, reason: String },

    #[error("price source {source_ref} unavailable for {token}: {reason}")]
    MissingPriceSource {
        token: String,
        source_ref: String,
        reason: String,
    },

    #[error("stale price from {source_ref} for {token}: {age_secs}s old (max {max_age_secs}s)")]
    StalePriceData {
        token: String,
        source_ref: String,
        age_secs: u64,
        max_age_secs: u64,
    },

    #[error("decimal mismatch for {token}: {reason}")]
    DecimalMismatch { token: String, reason: String },

    #[error("cyclic token pair for {token}: {path}")]
    CyclicTokenPair { token: String, path: String },

    #[error("negative premium: target {target} is below base {base}")]
    NegativePremium { base: String, target: String },

    #[error("no oracle config for token {0}")]
    UnknownOracleConfig(String),

    #[error("unknown market: {0}")]
    UnknownMarket(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("market {market} already carries category {existing}, cannot assign {requested}")]
    DuplicateCategoryAssignment {
        market: String,
        existing: String,
        requested: String,
    },

    #[error("token {token} is already listed as market {market}")]
    MarketAlreadyListed { token: String, market: String },

    #[error("adapter {adapter} for source {source_ref} is not supported here")]
    UnsupportedAdapter { source_ref: String, adapter: String },

    #[error("margin engine rejected update for market {market}: {reason}")]
    MarginEngineRejected { market: String, reason: String },

    #[error("unknown contract: {0}")]
    UnknownContract(String),

    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("invalid ratio: {0}")]
    InvalidRatio(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("math overflow: {0}")]
    MathOverflow(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RiskError>;
