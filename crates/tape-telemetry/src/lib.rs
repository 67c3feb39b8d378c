//! Prometheus metrics and structured logging for tapewatch.
//!
//! - Prometheus counters for the connection, bus, merge and alarm stages
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
