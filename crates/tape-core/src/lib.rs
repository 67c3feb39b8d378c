//! Core domain types for tapewatch.
//!
//! This crate provides the value types shared by every stage of the trade pipeline:
//! - `Currency`, `CurrencyPair`: Market identifiers as the feed spells them
//! - `Trade`, `TradeSide`, `TradeSource`: Immutable trade records
//! - `lenient`: Serde helpers for numbers the exchange sends as strings

pub mod error;
pub mod lenient;
pub mod market;
pub mod trade;

pub use error::{CoreError, Result};
pub use market::{Currency, CurrencyPair};
pub use trade::{Trade, TradeSide, TradeSource};

use std::future::Future;
use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
