//! Error types for Herd

use herd_domain::CurveError;
use thiserror::Error;

/// Error returned by a persistent store call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Network or database hiccup; the call may succeed next cycle
    #[error("Transient store error: {0}")]
    Transient(String),

    /// A record the caller expected to exist is missing
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        StoreError::Transient(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// General Herd error type
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rejected at the producer call site, never enters an accumulator
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<CurveError> for SettlementError {
    fn from(err: CurveError) -> Self {
        SettlementError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
