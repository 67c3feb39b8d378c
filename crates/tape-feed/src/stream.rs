//! Backlog + live trade merge.
//!
//! A [`TradeStream`] first replays the historical backlog in ascending id
//! order, then yields live trades for the pair's trade channel. The live trade
//! that repeats the last backlog id is dropped once. Any upstream failure ends
//! the stream with that error; nothing is retried here.
//!
//! When the last stream on a channel ends, `bts:unsubscribe` is sent on a
//! spawned task if the connection is still up. Failures are only logged.

use crate::bus::{EventBus, Subscription};
use crate::error::{FeedError, FeedResult};
use std::collections::VecDeque;
use std::sync::Arc;
use tape_core::{CurrencyPair, Trade};
use tape_history::{HistoryWindow, TradeHistory};
use tape_telemetry::Metrics;
use tape_ws::{ConnectionManager, ConnectionState, EventKind, LiveTradePayload, Topic};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Pending,
    Backlog,
    Live,
    Finished,
}

/// Lazy, non-restartable sequence of merged trades.
///
/// Nothing happens until the first call to [`TradeStream::next`].
pub struct TradeStream {
    pair: CurrencyPair,
    window: HistoryWindow,
    channel: String,
    history: Arc<dyn TradeHistory>,
    bus: Arc<EventBus>,
    connection: Arc<ConnectionManager>,
    phase: Phase,
    backlog: VecDeque<Trade>,
    /// Last backlog id, cleared once the live side has moved past it.
    seam_id: Option<u64>,
    subscription: Option<Subscription>,
    holds_channel: bool,
}

impl TradeStream {
    pub fn new(
        pair: CurrencyPair,
        window: HistoryWindow,
        history: Arc<dyn TradeHistory>,
        bus: Arc<EventBus>,
        connection: Arc<ConnectionManager>,
    ) -> Self {
        let channel = Topic::LiveTrades.channel(&pair);
        Self {
            pair,
            window,
            channel,
            history,
            bus,
            connection,
            phase: Phase::Pending,
            backlog: VecDeque::new(),
            seam_id: None,
            subscription: None,
            holds_channel: false,
        }
    }

    pub fn pair(&self) -> &CurrencyPair {
        &self.pair
    }

    /// Live channel this stream listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next merged trade. `None` after the stream has ended.
    pub async fn next(&mut self) -> Option<FeedResult<Trade>> {
        loop {
            match self.phase {
                Phase::Pending => {
                    if let Err(e) = self.start().await {
                        self.finish();
                        return Some(Err(e));
                    }
                    self.phase = Phase::Backlog;
                }
                Phase::Backlog => match self.backlog.pop_front() {
                    Some(trade) => {
                        Metrics::trade_emitted("backlog");
                        return Some(Ok(trade));
                    }
                    None => self.phase = Phase::Live,
                },
                Phase::Live => {
                    return match self.next_live().await {
                        Ok(trade) => Some(Ok(trade)),
                        Err(e) => {
                            self.finish();
                            Some(Err(e))
                        }
                    };
                }
                Phase::Finished => return None,
            }
        }
    }

    /// Drain the stream into `out` until it fails or the receiver goes away.
    pub async fn forward_to(mut self, out: mpsc::Sender<Trade>) -> FeedResult<()> {
        while let Some(item) = self.next().await {
            if out.send(item?).await.is_err() {
                debug!(channel = %self.channel, "Trade consumer gone, stopping stream");
                return Ok(());
            }
        }
        Ok(())
    }

    async fn start(&mut self) -> FeedResult<()> {
        let backlog = self.history.fetch(self.window, &self.pair, None).await?;
        self.seam_id = backlog.last().map(|t| t.id);
        info!(
            pair = %self.pair,
            window = %self.window,
            backlog = backlog.len(),
            seam_id = ?self.seam_id,
            "Starting trade stream"
        );
        self.backlog = backlog.into();

        // Register before asking for the channel so the first live trade
        // cannot slip past.
        self.subscription = Some(self.bus.subscribe());
        self.bus.claim_channel(&self.channel);
        self.holds_channel = true;
        self.connection.subscribe(&self.channel).await?;
        Ok(())
    }

    async fn next_live(&mut self) -> FeedResult<Trade> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Err(FeedError::Closed);
        };

        loop {
            let envelope = match subscription.recv().await {
                Some(Ok(envelope)) => envelope,
                Some(Err(e)) => return Err(FeedError::Transport(e)),
                None => return Err(FeedError::Closed),
            };

            if envelope.channel() != self.channel || envelope.kind() != EventKind::Trade {
                continue;
            }

            let trade = match envelope
                .live_trade()
                .and_then(LiveTradePayload::into_trade)
            {
                Ok(trade) => trade,
                Err(e) => {
                    Metrics::decode_error("trade");
                    warn!(channel = %self.channel, error = %e, "Skipping undecodable trade");
                    continue;
                }
            };

            if let Some(seam) = self.seam_id {
                if trade.id == seam {
                    self.seam_id = None;
                    Metrics::seam_duplicate();
                    debug!(id = trade.id, "Dropping live repeat of last backlog trade");
                    continue;
                }
                if trade.id > seam {
                    self.seam_id = None;
                }
            }

            Metrics::trade_emitted("live");
            return Ok(trade);
        }
    }

    fn finish(&mut self) {
        self.phase = Phase::Finished;
        self.backlog.clear();
        self.release();
    }

    fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bus.unsubscribe(subscription);
        }
        if std::mem::take(&mut self.holds_channel) && self.bus.release_channel(&self.channel) {
            self.unsubscribe_upstream();
        }
    }

    /// Needs a live connection and a runtime to spawn on; otherwise skipped.
    fn unsubscribe_upstream(&self) {
        if self.connection.state() != ConnectionState::Connected {
            debug!(channel = %self.channel, "Connection down, not unsubscribing");
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let connection = Arc::clone(&self.connection);
        let channel = self.channel.clone();
        runtime.spawn(async move {
            match connection.unsubscribe(&channel).await {
                Ok(()) => debug!(%channel, "Unsubscribed from channel"),
                Err(e) => debug!(%channel, error = %e, "Unsubscribe not sent"),
            }
        });
    }
}

impl Drop for TradeStream {
    fn drop(&mut self) {
        self.release();
    }
}
