//! Trade id ordering checks.
//!
//! Ids must increase within one source. A regression or repeat is reported as
//! `FeedError::Sequence` and never repaired; the caller decides what to do.

use crate::error::{FeedError, FeedResult};
use tape_core::{Trade, TradeSource};
use tape_telemetry::Metrics;

/// Tracks the last id seen per source.
#[derive(Debug, Default)]
pub struct SequenceMonitor {
    last_backlog: Option<u64>,
    last_live: Option<u64>,
}

impl SequenceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade, reporting an id that does not advance.
    pub fn observe(&mut self, trade: &Trade) -> FeedResult<()> {
        let last = match trade.source {
            TradeSource::Backlog => &mut self.last_backlog,
            TradeSource::Live => &mut self.last_live,
        };

        let high_water = last.map_or(trade.id, |prev| prev.max(trade.id));
        let previous = last.replace(high_water);
        match previous {
            Some(previous) if trade.id <= previous => {
                Metrics::sequence_error(&trade.source.to_string());
                Err(FeedError::Sequence {
                    origin: trade.source,
                    previous,
                    id: trade.id,
                })
            }
            _ => Ok(()),
        }
    }

    /// Highest id seen from a source.
    pub fn last_id(&self, source: TradeSource) -> Option<u64> {
        match source {
            TradeSource::Backlog => self.last_backlog,
            TradeSource::Live => self.last_live,
        }
    }
}
