//! Trade records.
//!
//! A `Trade` is created once per feed message (or backlog row) and is never
//! mutated afterwards. Trades are uniquely identified by the feed-assigned `id`,
//! which increases monotonically within one source.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Taker side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TryFrom<u8> for TradeSide {
    type Error = CoreError;

    /// Wire encoding: 0 = buy, 1 = sell.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Buy),
            1 => Ok(Self::Sell),
            other => Err(CoreError::InvalidSide(other)),
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Where a trade entered the merged sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSource {
    /// Replayed from the historical snapshot.
    Backlog,
    /// Received from the live channel.
    Live,
}

impl fmt::Display for TradeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backlog => write!(f, "backlog"),
            Self::Live => write!(f, "live"),
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Feed-assigned trade id.
    pub id: u64,
    /// Execution time.
    pub timestamp: DateTime<Utc>,
    /// Execution price in counter currency.
    pub price: f64,
    /// Executed amount in base currency.
    pub amount: f64,
    /// Taker side.
    pub side: TradeSide,
    /// Backlog replay or live tick.
    pub source: TradeSource,
}

impl Trade {
    /// True when the trade arrived on the live channel.
    pub fn is_live(&self) -> bool {
        self.source == TradeSource::Live
    }

    /// Notional value (price x amount).
    pub fn notional(&self) -> f64 {
        self.price * self.amount
    }
}
