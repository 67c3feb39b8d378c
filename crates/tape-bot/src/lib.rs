//! tapewatch: follows one currency pair's trade tape.
//!
//! Wires the pipeline crates together:
//! - Live websocket feed merged with the historical backlog
//! - Short and long window VWAP over the merged trades
//! - Price alarms with an optional notification command

pub mod app;
pub mod config;
pub mod error;
pub mod notifier;
pub mod status;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use notifier::AlarmNotifier;
