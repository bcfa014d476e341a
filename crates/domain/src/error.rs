use thiserror::Error;

/// Errors raised while constructing or checking domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid chain address: {0:?}")]
    InvalidAddress(String),
    #[error("action batch must contain at least one action")]
    EmptyBatch,
    #[error("state invariant violated: {0}")]
    InvalidState(String),
    #[error("invalid price range: lower {lower} is above upper {upper}")]
    InvalidRange { lower: String, upper: String },
    #[error("tick {0} is outside the supported range")]
    InvalidTick(i32),
    #[error("price must be positive, got {0}")]
    InvalidPrice(String),
}

/// Errors raised while loading the strategy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
