//! REST client for the public trade backlog.
//!
//! `GET {base}/transactions/{pair}/?time={minute|hour|day}` returns the most
//! recent trades for the pair, newest first. The client hands them back oldest
//! first so they can be replayed in id order ahead of the live channel.

use crate::error::{HistoryError, HistoryResult};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tape_core::{lenient, BoxFuture, CurrencyPair, Trade, TradeSide, TradeSource};
use tracing::{debug, info};

/// Default REST base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.bitstamp.net/api/v2";

/// Default timeout for backlog requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How far back the backlog reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryWindow {
    /// No backlog; the stream starts with live trades.
    None,
    Minute,
    #[default]
    Hour,
    Day,
}

impl HistoryWindow {
    /// Value of the `time` query parameter, `None` when no request is made.
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Minute => Some("minute"),
            Self::Hour => Some("hour"),
            Self::Day => Some("day"),
        }
    }
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_value().unwrap_or("none"))
    }
}

impl FromStr for HistoryWindow {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "minute" => Ok(Self::Minute),
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            other => Err(HistoryError::Decode(format!("unknown history window: {other}"))),
        }
    }
}

/// Source of historical trades.
pub trait TradeHistory: Send + Sync {
    /// Fetch the backlog for `pair`, ascending by id.
    ///
    /// With `since_id`, only trades with a greater id are returned.
    fn fetch(
        &self,
        window: HistoryWindow,
        pair: &CurrencyPair,
        since_id: Option<u64>,
    ) -> BoxFuture<'_, HistoryResult<Vec<Trade>>>;
}

/// One backlog row as returned by the REST endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BacklogRow {
    #[serde(deserialize_with = "lenient::unix_seconds")]
    pub date: chrono::DateTime<chrono::Utc>,
    #[serde(deserialize_with = "lenient::u64_from_any")]
    pub tid: u64,
    #[serde(deserialize_with = "lenient::f64_from_any")]
    pub price: f64,
    #[serde(deserialize_with = "lenient::f64_from_any")]
    pub amount: f64,
    /// 0 = buy, 1 = sell.
    #[serde(rename = "type", deserialize_with = "lenient::u8_from_any")]
    pub side: u8,
}

impl BacklogRow {
    pub fn into_trade(self) -> HistoryResult<Trade> {
        let side = TradeSide::try_from(self.side)
            .map_err(|e| HistoryError::InvalidRow(format!("tid={}: {e}", self.tid)))?;
        Ok(Trade {
            id: self.tid,
            timestamp: self.date,
            price: self.price,
            amount: self.amount,
            side,
            source: TradeSource::Backlog,
        })
    }
}

/// Convert raw rows into an ascending, `since_id`-filtered backlog.
pub fn into_backlog(rows: Vec<BacklogRow>, since_id: Option<u64>) -> HistoryResult<Vec<Trade>> {
    let mut trades = rows
        .into_iter()
        .filter(|row| since_id.map_or(true, |since| row.tid > since))
        .map(BacklogRow::into_trade)
        .collect::<HistoryResult<Vec<_>>>()?;
    trades.sort_by_key(|t| t.id);
    Ok(trades)
}

/// reqwest-backed backlog client.
pub struct HistoryClient {
    client: Client,
    base_url: String,
}

impl HistoryClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - REST API root (e.g., "https://www.bitstamp.net/api/v2")
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> HistoryResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HistoryError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Backlog endpoint for a pair.
    pub fn backlog_url(&self, pair: &CurrencyPair) -> String {
        format!(
            "{}/transactions/{}/",
            self.base_url.trim_end_matches('/'),
            pair
        )
    }

    async fn fetch_rows(&self, url: String, time: &'static str) -> HistoryResult<Vec<BacklogRow>> {
        let response = self
            .client
            .get(&url)
            .query(&[("time", time)])
            .send()
            .await
            .map_err(|e| HistoryError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| HistoryError::HttpClient(format!("Failed to read response: {e}")))?;
        serde_json::from_slice(&body).map_err(|e| HistoryError::Decode(e.to_string()))
    }
}

impl TradeHistory for HistoryClient {
    fn fetch(
        &self,
        window: HistoryWindow,
        pair: &CurrencyPair,
        since_id: Option<u64>,
    ) -> BoxFuture<'_, HistoryResult<Vec<Trade>>> {
        let url = self.backlog_url(pair);
        Box::pin(async move {
            let Some(time) = window.query_value() else {
                debug!("History window is none, skipping backlog");
                return Ok(Vec::new());
            };

            info!(%url, %window, ?since_id, "Fetching trade backlog");
            let rows = self.fetch_rows(url, time).await?;
            let trades = into_backlog(rows, since_id)?;
            debug!(count = trades.len(), "Backlog fetched");
            Ok(trades)
        })
    }
}

/// Recorded `fetch` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub window: HistoryWindow,
    pub pair: CurrencyPair,
    pub since_id: Option<u64>,
}

/// In-memory backlog for tests.
#[derive(Default)]
pub struct MockHistory {
    trades: Vec<Trade>,
    failure: Option<String>,
    calls: Mutex<Vec<FetchCall>>,
}

impl MockHistory {
    /// Serve the given trades (any order).
    pub fn new(trades: Vec<Trade>) -> Self {
        Self {
            trades,
            ..Default::default()
        }
    }

    /// Fail every fetch with an HTTP client error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().clone()
    }
}

impl TradeHistory for MockHistory {
    fn fetch(
        &self,
        window: HistoryWindow,
        pair: &CurrencyPair,
        since_id: Option<u64>,
    ) -> BoxFuture<'_, HistoryResult<Vec<Trade>>> {
        self.calls.lock().push(FetchCall {
            window,
            pair: pair.clone(),
            since_id,
        });

        let result = match (&self.failure, window) {
            (Some(message), _) => Err(HistoryError::HttpClient(message.clone())),
            (None, HistoryWindow::None) => Ok(Vec::new()),
            (None, _) => {
                let mut trades: Vec<Trade> = self
                    .trades
                    .iter()
                    .filter(|t| since_id.map_or(true, |since| t.id > since))
                    .cloned()
                    .collect();
                trades.sort_by_key(|t| t.id);
                Ok(trades)
            }
        };
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const ROWS: &str = r#"[
        {"date": "1600786463", "tid": "103", "price": "10460.33", "amount": "0.01000000", "type": "1"},
        {"date": "1600786460", "tid": "102", "price": "10461.00", "amount": "0.50000000", "type": "0"},
        {"date": 1600786400, "tid": 101, "price": 10459.5, "amount": 1.25, "type": 0}
    ]"#;

    /// Serve one canned HTTP response and report the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let request = String::from_utf8_lossy(&buf).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn test_window_parse_and_display() {
        assert_eq!("hour".parse::<HistoryWindow>().unwrap(), HistoryWindow::Hour);
        assert_eq!("".parse::<HistoryWindow>().unwrap(), HistoryWindow::None);
        assert_eq!(" Day ".parse::<HistoryWindow>().unwrap(), HistoryWindow::Day);
        assert!("week".parse::<HistoryWindow>().is_err());
        assert_eq!(HistoryWindow::Minute.to_string(), "minute");
        assert_eq!(HistoryWindow::None.to_string(), "none");
    }

    #[test]
    fn test_rows_sorted_ascending_and_filtered() {
        let rows: Vec<BacklogRow> = serde_json::from_str(ROWS).unwrap();
        let trades = into_backlog(rows.clone(), None).unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![101, 102, 103]);
        assert!(trades.iter().all(|t| t.source == TradeSource::Backlog));
        assert_eq!(trades[2].side, TradeSide::Sell);

        let trades = into_backlog(rows, Some(101)).unwrap();
        let ids: Vec<u64> = trades.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![102, 103]);
    }

    #[test]
    fn test_bad_side_is_rejected() {
        let rows: Vec<BacklogRow> = serde_json::from_str(
            r#"[{"date": "1600786463", "tid": "1", "price": "1", "amount": "1", "type": "7"}]"#,
        )
        .unwrap();
        assert!(matches!(
            into_backlog(rows, None),
            Err(HistoryError::InvalidRow(_))
        ));
    }

    #[test]
    fn test_backlog_url() {
        let client = HistoryClient::new("https://example.test/api/v2/", DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            client.backlog_url(&CurrencyPair::btc_usd()),
            "https://example.test/api/v2/transactions/btcusd/"
        );
    }

    #[tokio::test]
    async fn test_fetch_over_http() {
        let (base, server) = serve_once("200 OK", ROWS).await;
        let client = HistoryClient::new(base, DEFAULT_TIMEOUT).unwrap();

        let trades = client
            .fetch(HistoryWindow::Hour, &CurrencyPair::btc_usd(), None)
            .await
            .unwrap();
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].id, 101);

        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /transactions/btcusd/?time=hour "));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let (base, _server) = serve_once("503 Service Unavailable", "{}").await;
        let client = HistoryClient::new(base, DEFAULT_TIMEOUT).unwrap();

        let err = client
            .fetch(HistoryWindow::Day, &CurrencyPair::btc_usd(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, HistoryError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_window_none_skips_network() {
        // Nothing listens on this address.
        let client = HistoryClient::new("http://127.0.0.1:9", DEFAULT_TIMEOUT).unwrap();
        let trades = client
            .fetch(HistoryWindow::None, &CurrencyPair::btc_usd(), None)
            .await
            .unwrap();
        assert!(trades.is_empty());
    }

    #[tokio::test]
    async fn test_mock_history_records_calls() {
        let history = MockHistory::new(Vec::new());
        history
            .fetch(HistoryWindow::Minute, &CurrencyPair::btc_usd(), Some(5))
            .await
            .unwrap();
        assert_eq!(
            history.calls(),
            vec![FetchCall {
                window: HistoryWindow::Minute,
                pair: CurrencyPair::btc_usd(),
                since_id: Some(5),
            }]
        );

        let failing = MockHistory::failing("boom");
        assert!(failing
            .fetch(HistoryWindow::Hour, &CurrencyPair::btc_usd(), None)
            .await
            .is_err());
    }
}
