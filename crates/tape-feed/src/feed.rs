//! Pipeline facade: one connection, one bus, one backlog source.

use crate::bus::EventBus;
use crate::error::FeedResult;
use crate::reader::run_reader;
use crate::stream::TradeStream;
use std::sync::Arc;
use tape_core::{CurrencyPair, Trade};
use tape_history::{HistoryWindow, TradeHistory};
use tape_ws::ConnectionManager;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the shared pieces of one pipeline instance.
#[derive(Clone)]
pub struct TradeFeed {
    connection: Arc<ConnectionManager>,
    bus: Arc<EventBus>,
    history: Arc<dyn TradeHistory>,
}

impl TradeFeed {
    pub fn new(
        connection: Arc<ConnectionManager>,
        history: Arc<dyn TradeHistory>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            connection,
            bus: Arc::new(EventBus::new(queue_capacity)),
            history,
        }
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start the reader task feeding the bus.
    pub fn spawn_reader(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(run_reader(
            Arc::clone(&self.connection),
            Arc::clone(&self.bus),
            shutdown,
        ))
    }

    /// Merged backlog + live trades for `pair`.
    pub fn stream(&self, window: HistoryWindow, pair: CurrencyPair) -> TradeStream {
        TradeStream::new(
            pair,
            window,
            Arc::clone(&self.history),
            Arc::clone(&self.bus),
            Arc::clone(&self.connection),
        )
    }

    /// Write merged trades for `pair` into `out` until the stream fails or
    /// `out` is closed.
    pub async fn trades_live(
        &self,
        window: HistoryWindow,
        pair: CurrencyPair,
        out: mpsc::Sender<Trade>,
    ) -> FeedResult<()> {
        self.stream(window, pair).forward_to(out).await
    }
}
