//! One-line status output.

use std::time::Duration;
use tape_core::CurrencyPair;
use tokio::time::Instant;

/// Values shown on one status line.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub last: f64,
    pub short_window: chrono::Duration,
    pub short_vwap: f64,
    pub long_window: chrono::Duration,
    pub long_vwap: f64,
}

/// `BTC/USD  last 10012.50  vwap(1h) 10001.17  vwap(24h) 9950.02`
pub fn render(pair: &CurrencyPair, status: &Status) -> String {
    let precision = pair.counter.precision();
    format!(
        "{}  last {:.prec$}  vwap({}) {:.prec$}  vwap({}) {:.prec$}",
        pair.label(),
        status.last,
        window_label(status.short_window),
        status.short_vwap,
        window_label(status.long_window),
        status.long_vwap,
        prec = precision,
    )
}

/// Compact window label: "24h", "30m", "90s".
pub fn window_label(window: chrono::Duration) -> String {
    let secs = window.num_seconds();
    if secs > 0 && secs % 3_600 == 0 {
        format!("{}h", secs / 3_600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Lets at most one status line through per interval.
#[derive(Debug)]
pub struct StatusThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl StatusThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_uses_counter_precision() {
        let status = Status {
            last: 10_012.5,
            short_window: chrono::Duration::hours(1),
            short_vwap: 10_001.166,
            long_window: chrono::Duration::hours(24),
            long_vwap: 9_950.0,
        };
        assert_eq!(
            render(&CurrencyPair::btc_usd(), &status),
            "BTC/USD  last 10012.50  vwap(1h) 10001.17  vwap(24h) 9950.00"
        );

        let eth_btc: CurrencyPair = "eth/btc".parse().unwrap();
        assert!(render(&eth_btc, &status).starts_with("ETH/BTC  last 10012.50000000"));
    }

    #[test]
    fn test_window_label() {
        assert_eq!(window_label(chrono::Duration::hours(24)), "24h");
        assert_eq!(window_label(chrono::Duration::minutes(30)), "30m");
        assert_eq!(window_label(chrono::Duration::seconds(90)), "90s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_lets_one_line_per_interval() {
        let mut throttle = StatusThrottle::new(Duration::from_secs(1));
        assert!(throttle.ready());
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(throttle.ready());
    }
}
