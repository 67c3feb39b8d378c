//! Historical trade backlog for the merge stage.
//!
//! The backlog is a one-time REST snapshot of recent trades for a pair,
//! fetched before the live stream starts so consumers begin with context.

pub mod client;
pub mod error;

pub use client::{
    into_backlog, BacklogRow, FetchCall, HistoryClient, HistoryWindow, MockHistory, TradeHistory,
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT,
};
pub use error::{HistoryError, HistoryResult};
