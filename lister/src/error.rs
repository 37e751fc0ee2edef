use marginkit::RiskError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListerError {
    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("watch interval must be positive")]
    ZeroInterval,
}

pub type Result<T> = std::result::Result<T, ListerError>;
