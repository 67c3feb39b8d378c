//! History error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backlog decode error: {0}")]
    Decode(String),

    #[error("Invalid backlog row: {0}")]
    InvalidRow(String),
}

pub type HistoryResult<T> = Result<T, HistoryError>;
