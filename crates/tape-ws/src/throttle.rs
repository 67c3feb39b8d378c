//! Reconnect throttling.
//!
//! Successive dial attempts are spaced by at least a fixed minimum interval
//! so a flapping endpoint is not hammered.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Minimum-interval gate for dial attempts.
pub struct ReconnectThrottle {
    /// Minimum spacing between two attempts.
    min_interval: Duration,
    /// Start time of the most recent attempt.
    last_attempt: Mutex<Option<Instant>>,
}

impl ReconnectThrottle {
    /// Create a new throttle.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_attempt: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time left before the next attempt is allowed.
    pub fn remaining(&self) -> Duration {
        match *self.last_attempt.lock() {
            Some(last) => self.min_interval.saturating_sub(last.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Wait until an attempt is allowed, then record it.
    ///
    /// Callers are expected to serialize through the connection manager's
    /// dial slot, so only one task waits here at a time.
    pub async fn acquire(&self) {
        loop {
            let remaining = self.remaining();
            if remaining.is_zero() {
                break;
            }
            debug!(
                wait_ms = remaining.as_millis() as u64,
                "Throttling reconnect attempt"
            );
            tokio::time::sleep(remaining).await;
        }
        *self.last_attempt.lock() = Some(Instant::now());
    }

    /// Forget the last attempt.
    pub fn reset(&self) {
        *self.last_attempt.lock() = None;
    }
}
