//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] tape_feed::FeedError),

    #[error("History error: {0}")]
    History(#[from] tape_history::HistoryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tape_telemetry::TelemetryError),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
