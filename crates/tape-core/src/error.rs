//! Error types for tape-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Invalid currency pair: {0}")]
    InvalidPair(String),

    #[error("Invalid trade side: {0}")]
    InvalidSide(u8),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
