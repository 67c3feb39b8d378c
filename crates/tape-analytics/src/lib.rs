//! Analytics over the merged trade sequence.
//!
//! - `VwapSeries`: fixed-width buckets answering windowed VWAP queries
//! - `Alarm` / `AlarmEvaluator`: edge-triggered price threshold alarms
//!
//! Both are total functions of their inputs and are driven synchronously by
//! the task consuming the trade stream.

pub mod alarm;
pub mod error;
pub mod vwap;

pub use alarm::{check, Alarm, AlarmEvaluator, Direction};
pub use error::{AnalyticsError, AnalyticsResult};
pub use vwap::{VwapBucket, VwapSeries, DEFAULT_BUCKET_WIDTH_SECS};
