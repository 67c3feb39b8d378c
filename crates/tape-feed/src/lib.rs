//! Trade feed pipeline.
//!
//! Wires the websocket connection into an event bus and merges the historical
//! backlog with the live trade channel:
//! - `EventBus`: bounded per-subscriber queues with blocking fan-out
//! - `run_reader`: the single task moving envelopes from the connection to the bus
//! - `TradeStream`: backlog replay followed by deduplicated live trades
//! - `SequenceMonitor`: reports trade ids that fail to advance

pub mod bus;
pub mod error;
pub mod feed;
pub mod reader;
pub mod sequence;
pub mod stream;

pub use bus::{Delivery, EventBus, Subscription, SubscriptionId, DEFAULT_QUEUE_CAPACITY};
pub use error::{FeedError, FeedResult};
pub use feed::TradeFeed;
pub use reader::run_reader;
pub use sequence::SequenceMonitor;
pub use stream::TradeStream;
