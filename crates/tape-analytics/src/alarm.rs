//! Edge-triggered price alarms.
//!
//! An alarm fires when the price crosses its threshold between two
//! consecutive live trades, not while it stays on the far side.

use crate::error::{AnalyticsError, AnalyticsResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tape_core::Trade;
use tape_telemetry::Metrics;
use tracing::info;

/// Crossing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Fires when the price rises to or through the threshold.
    Above,
    /// Fires when the price falls below the threshold.
    Below,
}

impl Direction {
    pub fn symbol(&self) -> char {
        match self {
            Self::Above => '>',
            Self::Below => '<',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
        }
    }
}

/// A price threshold alarm, written `>10000` or `< 9500.5`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alarm {
    pub direction: Direction,
    pub threshold: f64,
}

impl Alarm {
    pub fn new(direction: Direction, threshold: f64) -> Self {
        Self {
            direction,
            threshold,
        }
    }

    /// Whether moving from `previous` to `current` crosses the threshold.
    pub fn triggers(&self, previous: f64, current: f64) -> bool {
        match self.direction {
            Direction::Above => current >= self.threshold && previous < self.threshold,
            Direction::Below => current < self.threshold && previous >= self.threshold,
        }
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.8}", self.direction.symbol(), self.threshold)
    }
}

impl FromStr for Alarm {
    type Err = AnalyticsError;

    fn from_str(input: &str) -> AnalyticsResult<Self> {
        let invalid = |reason: &str| AnalyticsError::InvalidAlarm {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let mut chars = trimmed.chars();
        let direction = match chars.next() {
            Some('>') => Direction::Above,
            Some('<') => Direction::Below,
            Some(_) => return Err(invalid("expected '>' or '<'")),
            None => return Err(invalid("empty alarm")),
        };

        let threshold: f64 = chars
            .as_str()
            .trim()
            .parse()
            .map_err(|_| invalid("threshold is not a number"))?;
        if !threshold.is_finite() {
            return Err(invalid("threshold must be finite"));
        }

        Ok(Self::new(direction, threshold))
    }
}

impl TryFrom<String> for Alarm {
    type Error = AnalyticsError;

    fn try_from(value: String) -> AnalyticsResult<Self> {
        value.parse()
    }
}

impl From<Alarm> for String {
    fn from(alarm: Alarm) -> Self {
        alarm.to_string()
    }
}

/// Alarms crossed by the move from `previous` to `current`, in input order.
pub fn check(previous: f64, current: f64, alarms: &[Alarm]) -> Vec<Alarm> {
    alarms
        .iter()
        .filter(|alarm| alarm.triggers(previous, current))
        .copied()
        .collect()
}

/// Feeds consecutive prices into a fixed alarm set.
///
/// Backlog trades only move the reference price; alarms are checked on live
/// trades, and never on the first price seen.
#[derive(Debug, Clone, Default)]
pub struct AlarmEvaluator {
    alarms: Vec<Alarm>,
    last_price: Option<f64>,
}

impl AlarmEvaluator {
    pub fn new(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms,
            last_price: None,
        }
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn last_price(&self) -> Option<f64> {
        self.last_price
    }

    pub fn observe(&mut self, trade: &Trade) -> Vec<Alarm> {
        let previous = self.last_price.replace(trade.price);

        let fired = match previous {
            Some(previous) if trade.is_live() => check(previous, trade.price, &self.alarms),
            _ => Vec::new(),
        };

        for alarm in &fired {
            Metrics::alarm_triggered(alarm.direction.as_str());
            info!(alarm = %alarm, price = trade.price, trade_id = trade.id, "Alarm triggered");
        }
        fired
    }
}
