//! Analytics error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("Invalid alarm {input:?}: {reason}")]
    InvalidAlarm { input: String, reason: String },
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;
