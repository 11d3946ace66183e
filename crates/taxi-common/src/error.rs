//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, TaxiError>;

/// Errors raised while parsing or validating shared settings
#[derive(Error, Debug)]
pub enum TaxiError {
    #[error("Unknown loading strategy '{0}' (expected 'copy' or 'values')")]
    UnknownStrategy(String),

    #[error("Invalid log setting: {0}")]
    InvalidLogSetting(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

