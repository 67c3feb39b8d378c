//! Main application orchestration.
//!
//! Coordinates:
//! - Reader task feeding the event bus
//! - Merged trade stream for the configured pair
//! - VWAP, alarms and sequence checks on every trade
//! - Status line output and alarm notifications

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::notifier::AlarmNotifier;
use crate::status::{self, Status, StatusThrottle};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tape_analytics::{Alarm, AlarmEvaluator, VwapSeries};
use tape_core::{CurrencyPair, Trade};
use tape_feed::{SequenceMonitor, TradeFeed};
use tape_history::HistoryClient;
use tape_telemetry::Metrics;
use tape_ws::ConnectionManager;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-trade analytics driven by the merged stream.
pub struct TradeDriver {
    pair: CurrencyPair,
    vwap: VwapSeries,
    alarms: AlarmEvaluator,
    notifier: Option<AlarmNotifier>,
    sequence: SequenceMonitor,
    short_window: chrono::Duration,
    long_window: chrono::Duration,
    /// Backlog trades before this are skipped.
    cutoff: DateTime<Utc>,
    status: StatusThrottle,
    last_price: Option<f64>,
    trades_seen: u64,
    trades_skipped: u64,
}

impl TradeDriver {
    pub fn new(config: &AppConfig, started: DateTime<Utc>) -> Self {
        let analytics = &config.analytics;
        let notifier = config
            .alarm
            .command
            .as_ref()
            .map(|template| AlarmNotifier::new(template.clone(), config.alarm.cooldown()));

        Self {
            pair: config.pair.clone(),
            vwap: VwapSeries::new(analytics.bucket_width()),
            alarms: AlarmEvaluator::new(config.alarm.alarms.clone()),
            notifier,
            sequence: SequenceMonitor::new(),
            short_window: analytics.short_window(),
            long_window: analytics.long_window(),
            cutoff: started
                .checked_sub_signed(analytics.display_window())
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            status: StatusThrottle::new(analytics.status_interval()),
            last_price: None,
            trades_seen: 0,
            trades_skipped: 0,
        }
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn vwap(&self) -> &VwapSeries {
        &self.vwap
    }

    pub fn trades_seen(&self) -> u64 {
        self.trades_seen
    }

    pub fn trades_skipped(&self) -> u64 {
        self.trades_skipped
    }

    /// Feed one merged trade through. Returns the alarms it triggered.
    pub fn handle(&mut self, trade: &Trade) -> Vec<Alarm> {
        if !trade.is_live() && trade.timestamp < self.cutoff {
            self.trades_skipped += 1;
            return Vec::new();
        }
        self.trades_seen += 1;

        if let Err(e) = self.sequence.observe(trade) {
            warn!(error = %e, "Trade out of sequence");
        }

        self.vwap.add(trade.timestamp, trade.price, trade.amount);
        let oldest = self
            .long_window
            .max(self.short_window)
            .checked_add(&self.vwap.width())
            .and_then(|horizon| trade.timestamp.checked_sub_signed(horizon));
        if let Some(oldest) = oldest {
            self.vwap.trim_before(oldest);
        }

        let fired = self.alarms.observe(trade);
        if let Some(notifier) = self.notifier.as_mut() {
            for alarm in &fired {
                // The command's outcome is logged by the spawned task.
                let _ = notifier.notify(trade.price, alarm);
            }
        }

        self.last_price = Some(trade.price);
        Metrics::price_set("last", trade.price);

        if trade.is_live() && self.status.ready() {
            let status = self.status_at(trade.timestamp, trade.price);
            Metrics::price_set("vwap_short", status.short_vwap);
            Metrics::price_set("vwap_long", status.long_vwap);
            println!("{}", status::render(&self.pair, &status));
        }

        fired
    }

    /// VWAP values for windows ending at `at`.
    pub fn status_at(&self, at: DateTime<Utc>, last: f64) -> Status {
        Status {
            last,
            short_window: self.short_window,
            short_vwap: self.vwap.window_value(at, self.short_window),
            long_window: self.long_window,
            long_vwap: self.vwap.window_value(at, self.long_window),
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    feed: TradeFeed,
}

impl Application {
    /// Create the application with the network-backed feed.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let connection = Arc::new(ConnectionManager::new((&config.ws).into()));
        let history = Arc::new(HistoryClient::new(
            config.history.base_url.clone(),
            config.history.timeout(),
        )?);
        let feed = TradeFeed::new(connection, history, config.ws.queue_capacity);

        Ok(Self { config, feed })
    }

    /// Create the application around an existing feed.
    pub fn with_feed(config: AppConfig, feed: TradeFeed) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config, feed })
    }

    /// Run until Ctrl-C or a fatal stream error.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let signal = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    shutdown.cancel();
                }
            }
        });

        let result = self.run_until(shutdown).await;
        signal.abort();
        result
    }

    /// Run until `shutdown` is cancelled or the trade stream ends.
    pub async fn run_until(self, shutdown: CancellationToken) -> AppResult<()> {
        let pair = self.config.pair.clone();
        let window = self.config.history_window;
        info!(pair = %pair, window = %window, "Starting application");

        let reader_shutdown = shutdown.child_token();
        let reader = self.feed.spawn_reader(reader_shutdown.clone());
        let reader_guard = reader_shutdown.drop_guard();

        let (trade_tx, mut trade_rx) = mpsc::channel::<Trade>(self.config.ws.queue_capacity);
        let mut pump = tokio::spawn({
            let feed = self.feed.clone();
            let pair = pair.clone();
            async move { feed.trades_live(window, pair, trade_tx).await }
        });

        let mut driver = TradeDriver::new(&self.config, Utc::now());

        info!("Entering main event loop");
        let result = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                trade = trade_rx.recv() => match trade {
                    Some(trade) => {
                        driver.handle(&trade);
                    }
                    None => break match (&mut pump).await {
                        Ok(Ok(())) => {
                            info!("Trade stream ended");
                            Ok(())
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "Trade stream failed");
                            Err(AppError::Feed(e))
                        }
                        Err(e) => {
                            error!(error = %e, "Trade pump task failed");
                            Err(AppError::Task(e))
                        }
                    },
                },
            }
        };

        drop(trade_rx);
        pump.abort();
        drop(reader_guard);
        reader.await?;

        info!(
            trades = driver.trades_seen(),
            skipped = driver.trades_skipped(),
            last_price = ?driver.last_price(),
            "Shutting down"
        );
        debug!(buckets = driver.vwap().len(), "VWAP buckets retained");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tape_core::{TradeSide, TradeSource};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_600_000_000 + secs, 0).unwrap()
    }

    fn trade(id: u64, secs: i64, price: f64, source: TradeSource) -> Trade {
        Trade {
            id,
            timestamp: at(secs),
            price,
            amount: 1.0,
            side: TradeSide::Sell,
            source,
        }
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.analytics.display_window_secs = 3_600;
        config.analytics.short_window_secs = 600;
        config.analytics.long_window_secs = 3_600;
        config.alarm.alarms = vec![">105".parse().unwrap(), "<95".parse().unwrap()];
        config
    }

    #[tokio::test]
    async fn test_old_backlog_is_skipped() {
        let mut driver = TradeDriver::new(&config(), at(7_200));

        driver.handle(&trade(1, 0, 50.0, TradeSource::Backlog));
        driver.handle(&trade(2, 3_700, 100.0, TradeSource::Backlog));

        assert_eq!(driver.trades_skipped(), 1);
        assert_eq!(driver.trades_seen(), 1);
        assert_eq!(driver.last_price(), Some(100.0));
        assert_eq!(driver.vwap().len(), 1);
    }

    #[tokio::test]
    async fn test_alarms_fire_on_live_crossings_only() {
        let mut driver = TradeDriver::new(&config(), at(0));

        assert!(driver.handle(&trade(1, 1, 110.0, TradeSource::Backlog)).is_empty());
        assert!(driver.handle(&trade(2, 2, 100.0, TradeSource::Live)).is_empty());

        let fired = driver.handle(&trade(3, 3, 106.0, TradeSource::Live));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].to_string(), "> 105.00000000");

        let fired = driver.handle(&trade(4, 4, 90.0, TradeSource::Live));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].to_string(), "< 95.00000000");
    }

    #[tokio::test]
    async fn test_status_windows() {
        let mut driver = TradeDriver::new(&config(), at(0));
        driver.handle(&trade(1, 0, 100.0, TradeSource::Backlog));
        driver.handle(&trade(2, 1_000, 200.0, TradeSource::Live));

        let status = driver.status_at(at(1_000), 200.0);
        assert_eq!(status.short_vwap, 200.0);
        assert_eq!(status.long_vwap, 150.0);
    }

    #[tokio::test]
    async fn test_unbounded_windows_do_not_overflow() {
        let mut config = config();
        config.analytics.display_window_secs = i64::MAX / 1000;
        config.analytics.long_window_secs = i64::MAX;

        let mut driver = TradeDriver::new(&config, at(0));
        driver.handle(&trade(1, -86_400 * 365, 100.0, TradeSource::Backlog));
        driver.handle(&trade(2, 1, 101.0, TradeSource::Live));

        assert_eq!(driver.trades_skipped(), 0);
        assert_eq!(driver.vwap().len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_sequence_trade_still_counts() {
        let mut driver = TradeDriver::new(&config(), at(0));
        driver.handle(&trade(5, 1, 100.0, TradeSource::Live));
        driver.handle(&trade(4, 2, 101.0, TradeSource::Live));
        assert_eq!(driver.trades_seen(), 2);
        assert_eq!(driver.last_price(), Some(101.0));
    }
}
