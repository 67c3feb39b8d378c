//! Bucketed volume-weighted average price.
//!
//! Trades are folded into fixed-width buckets. A bucket stays open until a
//! trade arrives more than one width after its start; buckets are therefore
//! appended in non-decreasing start order and can be range-searched.

use chrono::{DateTime, Duration, Utc};

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_WIDTH_SECS: i64 = 300;

/// Pre-aggregated trades of one bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct VwapBucket {
    /// Timestamp of the trade that opened the bucket.
    pub start: DateTime<Utc>,
    /// Sum of trade prices.
    pub price_sum: f64,
    /// Sum of trade amounts.
    pub volume_sum: f64,
    /// Number of trades folded in.
    pub count: u64,
}

impl VwapBucket {
    fn open(start: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            start,
            price_sum: price,
            volume_sum: volume,
            count: 1,
        }
    }

    pub fn mean_price(&self) -> f64 {
        self.price_sum / self.count as f64
    }

    pub fn mean_volume(&self) -> f64 {
        self.volume_sum / self.count as f64
    }
}

/// Append-only series of VWAP buckets.
#[derive(Debug, Clone)]
pub struct VwapSeries {
    width: Duration,
    buckets: Vec<VwapBucket>,
}

impl VwapSeries {
    pub fn new(width: Duration) -> Self {
        Self {
            width,
            buckets: Vec::new(),
        }
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    pub fn buckets(&self) -> &[VwapBucket] {
        &self.buckets
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Fold one trade in, opening a new bucket when `timestamp` is more than
    /// one width past the open bucket's start.
    pub fn add(&mut self, timestamp: DateTime<Utc>, price: f64, volume: f64) {
        match self.buckets.last_mut() {
            Some(open) if timestamp - open.start <= self.width => {
                open.price_sum += price;
                open.volume_sum += volume;
                open.count += 1;
            }
            _ => self
                .buckets
                .push(VwapBucket::open(timestamp, price, volume)),
        }
    }

    /// Contiguous buckets whose start lies in `[from, until]`.
    pub fn range(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> &[VwapBucket] {
        let lo = self.buckets.partition_point(|b| b.start < from);
        let hi = self.buckets.partition_point(|b| b.start <= until);
        if lo >= hi {
            return &[];
        }
        &self.buckets[lo..hi]
    }

    /// VWAP over the `window` ending at `until`.
    pub fn window_value(&self, until: DateTime<Utc>, window: Duration) -> f64 {
        let from = until
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self::value(self.range(from, until))
    }

    /// `Σ(mean price × mean volume) / Σ(mean volume)`; 0 when volume is 0.
    pub fn value(buckets: &[VwapBucket]) -> f64 {
        let (weighted, volume) = buckets.iter().fold((0.0, 0.0), |(n, vol), b| {
            let mean_volume = b.mean_volume();
            (n + b.mean_price() * mean_volume, vol + mean_volume)
        });
        if volume == 0.0 {
            return 0.0;
        }
        weighted / volume
    }

    /// Drop buckets that started before `cutoff`.
    pub fn trim_before(&mut self, cutoff: DateTime<Utc>) {
        let keep_from = self.buckets.partition_point(|b| b.start < cutoff);
        if keep_from > 0 {
            self.buckets.drain(..keep_from);
        }
    }
}

impl Default for VwapSeries {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_BUCKET_WIDTH_SECS))
    }
}
