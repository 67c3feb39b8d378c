//! Wire codec for the trade feed.
//!
//! Outbound: subscribe / unsubscribe requests for a channel.
//! Inbound: every server message is an [`Envelope`] of
//! `{"channel": ..., "event": ..., "data": ...}` whose `data` stays undecoded
//! until a consumer asks for the shape it expects.

use crate::error::{WsError, WsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::fmt;
use tape_core::lenient;
use tape_core::{CurrencyPair, Trade, TradeSide, TradeSource};

// ============================================================================
// Channels
// ============================================================================

/// Feed topic. A channel name is the topic prefix followed by the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    LiveTrades,
    LiveOrders,
    OrderBook,
    DetailOrderBook,
    DiffOrderBook,
}

impl Topic {
    /// Fixed channel prefix for this topic.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::LiveTrades => "live_trades_",
            Self::LiveOrders => "live_orders_",
            Self::OrderBook => "order_book_",
            Self::DetailOrderBook => "detail_order_book_",
            Self::DiffOrderBook => "diff_order_book_",
        }
    }

    /// Channel name for a pair, e.g. `live_trades_btcusd`.
    pub fn channel(&self, pair: &CurrencyPair) -> String {
        format!("{}{}", self.prefix(), pair)
    }
}

// ============================================================================
// Event kinds
// ============================================================================

/// Event kind carried by an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Trade,
    OrderCreated,
    OrderChanged,
    OrderDeleted,
    /// Order book snapshot / diff payload.
    Data,
    /// Acknowledgement of a subscribe request.
    SubscriptionSucceeded,
    /// Server asks the client to reconnect.
    RequestReconnect,
    /// Server-side error report.
    Error,
    /// Anything this codec does not know about.
    Other(String),
}

impl EventKind {
    pub fn parse(event: &str) -> Self {
        match event {
            "trade" => Self::Trade,
            "order_created" => Self::OrderCreated,
            "order_changed" => Self::OrderChanged,
            "order_deleted" => Self::OrderDeleted,
            "data" => Self::Data,
            "bts:subscription_succeeded" => Self::SubscriptionSucceeded,
            "bts:request_reconnect" => Self::RequestReconnect,
            "bts:error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Trade => "trade",
            Self::OrderCreated => "order_created",
            Self::OrderChanged => "order_changed",
            Self::OrderDeleted => "order_deleted",
            Self::Data => "data",
            Self::SubscriptionSucceeded => "bts:subscription_succeeded",
            Self::RequestReconnect => "bts:request_reconnect",
            Self::Error => "bts:error",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Outbound requests
// ============================================================================

/// Subscription intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionIntent {
    #[serde(rename = "bts:subscribe")]
    Subscribe,
    #[serde(rename = "bts:unsubscribe")]
    Unsubscribe,
}

/// Subscribe / unsubscribe request.
///
/// Wire format: `{"event": "bts:subscribe", "data": {"channel": "live_trades_btcusd"}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub event: SubscriptionIntent,
    pub data: ChannelRef,
}

/// Channel reference inside a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel: String,
}

impl SubscriptionRequest {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            event: SubscriptionIntent::Subscribe,
            data: ChannelRef {
                channel: channel.into(),
            },
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            event: SubscriptionIntent::Unsubscribe,
            data: ChannelRef {
                channel: channel.into(),
            },
        }
    }

    pub fn channel(&self) -> &str {
        &self.data.channel
    }

    /// Serialize to the text frame sent on the wire.
    pub fn encode(&self) -> WsResult<String> {
        serde_json::to_string(self).map_err(|e| WsError::Encode(e.to_string()))
    }

    /// Parse a request back from its wire form.
    pub fn decode(text: &str) -> WsResult<Self> {
        serde_json::from_str(text).map_err(|e| WsError::Decode(e.to_string()))
    }
}

// ============================================================================
// Inbound envelope
// ============================================================================

#[derive(Deserialize)]
struct RawEnvelope {
    channel: String,
    event: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

/// Generic inbound message.
///
/// Immutable once produced. `data` is kept as raw JSON so each consumer decodes
/// only the shape it expects; a failed decode affects only that attempt.
#[derive(Debug, Clone)]
pub struct Envelope {
    channel: String,
    event: String,
    data: Box<RawValue>,
}

impl Envelope {
    /// Decode a text frame.
    pub fn from_text(text: &str) -> WsResult<Self> {
        let raw: RawEnvelope =
            serde_json::from_str(text).map_err(|e| WsError::Decode(e.to_string()))?;
        let data = match raw.data {
            Some(data) => data,
            None => RawValue::from_string("null".to_string())
                .map_err(|e| WsError::Decode(e.to_string()))?,
        };
        Ok(Self {
            channel: raw.channel,
            event: raw.event,
            data,
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn kind(&self) -> EventKind {
        EventKind::parse(&self.event)
    }

    /// Undecoded payload JSON.
    pub fn payload(&self) -> &str {
        self.data.get()
    }

    /// Decode the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> WsResult<T> {
        serde_json::from_str(self.data.get()).map_err(|e| {
            WsError::Decode(format!(
                "channel={} event={}: {e}",
                self.channel, self.event
            ))
        })
    }

    /// Decode a `trade` event payload.
    pub fn live_trade(&self) -> WsResult<LiveTradePayload> {
        if self.kind() != EventKind::Trade {
            return Err(WsError::Decode(format!(
                "expected trade event, got {}",
                self.event
            )));
        }
        self.decode()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Live trade payload from a `live_trades_*` channel.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveTradePayload {
    #[serde(deserialize_with = "lenient::u64_from_any")]
    pub id: u64,
    #[serde(default, deserialize_with = "option_u64")]
    pub buy_order_id: Option<u64>,
    #[serde(default, deserialize_with = "option_u64")]
    pub sell_order_id: Option<u64>,
    /// 0 = buy, 1 = sell.
    #[serde(rename = "type", deserialize_with = "lenient::u8_from_any")]
    pub side: u8,
    #[serde(deserialize_with = "lenient::f64_from_any")]
    pub amount: f64,
    #[serde(deserialize_with = "lenient::f64_from_any")]
    pub price: f64,
    /// Unix seconds.
    #[serde(deserialize_with = "lenient::unix_seconds")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Unix microseconds. Preferred over `timestamp` when present.
    #[serde(default, deserialize_with = "lenient::option_unix_micros")]
    pub microtimestamp: Option<chrono::DateTime<chrono::Utc>>,
}

fn option_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    lenient::u64_from_any(deserializer).map(Some)
}

impl LiveTradePayload {
    /// Convert into a live [`Trade`].
    pub fn into_trade(self) -> WsResult<Trade> {
        let side = TradeSide::try_from(self.side).map_err(|e| WsError::Decode(e.to_string()))?;
        Ok(Trade {
            id: self.id,
            timestamp: self.microtimestamp.unwrap_or(self.timestamp),
            price: self.price,
            amount: self.amount,
            side,
            source: TradeSource::Live,
        })
    }
}
