//! Application configuration.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tape_analytics::{Alarm, DEFAULT_BUCKET_WIDTH_SECS};
use tape_core::CurrencyPair;
use tape_feed::DEFAULT_QUEUE_CAPACITY;
use tape_history::{HistoryWindow, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use tape_ws::{ConnectionConfig, DEFAULT_WS_URL};

/// Upper bound for every analytics window and the bucket width (s).
pub const MAX_WINDOW_SECS: i64 = 366 * 86_400;

/// Environment variable consulted when no `--config` is given.
pub const CONFIG_ENV: &str = "TAPEWATCH_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pair to follow.
    pub pair: CurrencyPair,
    /// Backlog replayed before live trades.
    pub history_window: HistoryWindow,
    pub ws: WsConfig,
    pub history: HistoryConfig,
    pub analytics: AnalyticsConfig,
    pub alarm: AlarmConfig,
}

/// Websocket feed section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsConfig {
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// Minimum gap between two dials (ms).
    #[serde(default = "default_min_reconnect_interval_ms")]
    pub min_reconnect_interval_ms: u64,
    /// Per-subscriber dispatch queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_min_reconnect_interval_ms() -> u64 {
    2_000
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            min_reconnect_interval_ms: default_min_reconnect_interval_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl From<&WsConfig> for ConnectionConfig {
    fn from(cfg: &WsConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            min_reconnect_interval_ms: cfg.min_reconnect_interval_ms,
        }
    }
}

/// Backlog REST section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_base_url")]
    pub base_url: String,
    #[serde(default = "default_history_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_history_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_history_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_history_base_url(),
            timeout_secs: default_history_timeout_secs(),
        }
    }
}

impl HistoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// VWAP and display section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_bucket_width_secs")]
    pub bucket_width_secs: i64,
    /// Short VWAP window (s). Default: 1 hour.
    #[serde(default = "default_short_window_secs")]
    pub short_window_secs: i64,
    /// Long VWAP window (s). Default: 24 hours.
    #[serde(default = "default_long_window_secs")]
    pub long_window_secs: i64,
    /// Backlog trades older than this (s) are skipped. Default: 24 hours.
    #[serde(default = "default_display_window_secs")]
    pub display_window_secs: i64,
    /// Minimum gap between two status lines (ms).
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_bucket_width_secs() -> i64 {
    DEFAULT_BUCKET_WIDTH_SECS
}

fn default_short_window_secs() -> i64 {
    3_600
}

fn default_long_window_secs() -> i64 {
    86_400
}

fn default_display_window_secs() -> i64 {
    86_400
}

fn default_status_interval_ms() -> u64 {
    1_000
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            bucket_width_secs: default_bucket_width_secs(),
            short_window_secs: default_short_window_secs(),
            long_window_secs: default_long_window_secs(),
            display_window_secs: default_display_window_secs(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

impl AnalyticsConfig {
    pub fn bucket_width(&self) -> chrono::Duration {
        seconds(self.bucket_width_secs)
    }

    pub fn short_window(&self) -> chrono::Duration {
        seconds(self.short_window_secs)
    }

    pub fn long_window(&self) -> chrono::Duration {
        seconds(self.long_window_secs)
    }

    pub fn display_window(&self) -> chrono::Duration {
        seconds(self.display_window_secs)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }
}

/// Out-of-range values saturate; `validate` rejects them up front.
fn seconds(secs: i64) -> chrono::Duration {
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

/// Alarm section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmConfig {
    /// Alarm expressions such as `">10000"`.
    #[serde(default)]
    pub alarms: Vec<Alarm>,
    /// Shell command run on a triggered alarm; `%p` is the price, `%a` the alarm.
    #[serde(default)]
    pub command: Option<String>,
    /// Minimum gap between two command runs (s).
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    5
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            alarms: Vec::new(),
            command: None,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl AlarmConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Command line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub pair: Option<CurrencyPair>,
    pub history_window: Option<HistoryWindow>,
    pub alarms: Vec<Alarm>,
    pub alarm_command: Option<String>,
    pub display_window_secs: Option<i64>,
}

impl AppConfig {
    /// Load from `path`, else from `TAPEWATCH_CONFIG`, else defaults.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match std::env::var(CONFIG_ENV) {
            Ok(path) if Path::new(&path).exists() => Self::from_file(&path),
            Ok(path) => {
                tracing::warn!(path = %path, "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply command line overrides. Alarms given on the command line replace
    /// the configured list.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(pair) = overrides.pair {
            self.pair = pair;
        }
        if let Some(window) = overrides.history_window {
            self.history_window = window;
        }
        if !overrides.alarms.is_empty() {
            self.alarm.alarms = overrides.alarms;
        }
        if overrides.alarm_command.is_some() {
            self.alarm.command = overrides.alarm_command;
        }
        if let Some(secs) = overrides.display_window_secs {
            self.analytics.display_window_secs = secs;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if !self.alarm.alarms.is_empty()
            && self.alarm.command.as_deref().map_or(true, |c| c.trim().is_empty())
        {
            return Err(AppError::Config(
                "alarms are configured but no alarm command is set".to_string(),
            ));
        }
        if self.ws.queue_capacity == 0 {
            return Err(AppError::Config("ws.queue_capacity must be > 0".to_string()));
        }

        let analytics = &self.analytics;
        for (name, secs) in [
            ("bucket_width_secs", analytics.bucket_width_secs),
            ("short_window_secs", analytics.short_window_secs),
            ("long_window_secs", analytics.long_window_secs),
            ("display_window_secs", analytics.display_window_secs),
        ] {
            if secs <= 0 {
                return Err(AppError::Config(format!("analytics.{name} must be > 0")));
            }
            if secs > MAX_WINDOW_SECS {
                return Err(AppError::Config(format!(
                    "analytics.{name} must be at most {MAX_WINDOW_SECS}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tape_analytics::Direction;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pair, CurrencyPair::btc_usd());
        assert_eq!(config.history_window, HistoryWindow::Hour);
        assert_eq!(config.ws.url, DEFAULT_WS_URL);
        assert_eq!(config.ws.min_reconnect_interval_ms, 2_000);
        assert_eq!(config.alarm.cooldown_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            pair = "eth/eur"
            history_window = "day"

            [ws]
            queue_capacity = 8

            [alarm]
            alarms = [">3000", "< 2500.5"]
            command = "notify-send tapewatch %a"
            "#,
        )
        .unwrap();

        assert_eq!(config.pair.to_string(), "etheur");
        assert_eq!(config.history_window, HistoryWindow::Day);
        assert_eq!(config.ws.queue_capacity, 8);
        assert_eq!(config.ws.min_reconnect_interval_ms, 2_000);
        assert_eq!(config.alarm.alarms.len(), 2);
        assert_eq!(config.alarm.alarms[1].direction, Direction::Below);
        assert_eq!(config.analytics.long_window_secs, 86_400);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_alarm_is_a_parse_error() {
        let err = AppConfig::from_toml("[alarm]\nalarms = [\"=5\"]\n").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_alarms_without_command_rejected() {
        let mut config = AppConfig::default();
        config.alarm.alarms = vec!["<9000".parse().unwrap()];
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.alarm.command = Some("   ".to_string());
        assert!(config.validate().is_err());

        config.alarm.command = Some("echo %p".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut config = AppConfig::default();
        config.alarm.alarms = vec![">1".parse().unwrap()];

        config.apply(Overrides {
            pair: Some("ltc-btc".parse().unwrap()),
            history_window: Some(HistoryWindow::None),
            alarms: vec!["<5".parse().unwrap()],
            alarm_command: Some("echo".to_string()),
            display_window_secs: Some(600),
        });

        assert_eq!(config.pair.to_string(), "ltcbtc");
        assert_eq!(config.history_window, HistoryWindow::None);
        let expected: Alarm = "<5".parse().unwrap();
        assert_eq!(config.alarm.alarms, vec![expected]);
        assert_eq!(config.alarm.command.as_deref(), Some("echo"));
        assert_eq!(config.analytics.display_window_secs, 600);
    }

    #[test]
    fn test_non_positive_window_rejected() {
        let mut config = AppConfig::default();
        config.analytics.short_window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_window_rejected() {
        let mut config = AppConfig::default();
        config.analytics.display_window_secs = i64::MAX / 1000;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.apply(Overrides {
            display_window_secs: Some(MAX_WINDOW_SECS + 1),
            ..Default::default()
        });
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.analytics.long_window_secs = MAX_WINDOW_SECS;
        config.analytics.bucket_width_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("history_window"));
        assert!(toml_str.contains("[analytics]"));
    }
}
