//! Websocket connection manager.
//!
//! Owns at most one physical connection at a time. The connection is opened
//! lazily by whichever operation needs it first; concurrent callers share a
//! single in-flight attempt and all observe its outcome. Dial attempts are
//! spaced by a minimum reconnect interval. The manager never retries on its
//! own: a failed operation tears the connection down and returns the error,
//! and the next operation dials again.

use crate::error::{WsError, WsResult};
use crate::message::{Envelope, SubscriptionRequest};
use crate::throttle::ReconnectThrottle;
use crate::transport::{BoxFuture, Dialer, FrameSink, FrameSource, Transport, TungsteniteDialer};
use futures_util::future::{FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info, warn};

/// Default public feed endpoint.
pub const DEFAULT_WS_URL: &str = "wss://ws.bitstamp.net";

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Websocket URL.
    pub url: String,
    /// Minimum spacing between two dial attempts.
    pub min_reconnect_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            min_reconnect_interval_ms: 2000,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// One established physical connection.
///
/// Reads and writes are guarded independently so a pending read never blocks
/// a subscribe request.
pub struct Connection {
    generation: u64,
    sink: TokioMutex<Box<dyn FrameSink>>,
    source: TokioMutex<Box<dyn FrameSource>>,
}

impl Connection {
    fn new(generation: u64, transport: Transport) -> Self {
        Self {
            generation,
            sink: TokioMutex::new(transport.sink),
            source: TokioMutex::new(transport.source),
        }
    }

    /// Dial sequence number of this connection (1 for the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    async fn send_text(&self, text: String) -> WsResult<()> {
        self.sink.lock().await.send_text(text).await
    }

    async fn next_text(&self) -> WsResult<String> {
        self.source.lock().await.next_text().await
    }

    async fn close(&self) -> WsResult<()> {
        self.sink.lock().await.close().await
    }
}

type DialFuture = Shared<BoxFuture<'static, WsResult<Arc<Connection>>>>;

enum Slot {
    Idle,
    Dialing { generation: u64, attempt: DialFuture },
    Connected(Arc<Connection>),
}

/// Websocket connection manager.
pub struct ConnectionManager {
    dialer: Arc<dyn Dialer>,
    throttle: Arc<ReconnectThrottle>,
    slot: Mutex<Slot>,
    next_generation: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager that dials the configured websocket URL.
    pub fn new(config: ConnectionConfig) -> Self {
        let dialer = Arc::new(TungsteniteDialer::new(config.url.clone()));
        Self::with_dialer(config, dialer)
    }

    /// Create a manager on top of a custom dialer.
    pub fn with_dialer(config: ConnectionConfig, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            dialer,
            throttle: Arc::new(ReconnectThrottle::new(Duration::from_millis(
                config.min_reconnect_interval_ms,
            ))),
            slot: Mutex::new(Slot::Idle),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        match &*self.slot.lock() {
            Slot::Idle => ConnectionState::Disconnected,
            Slot::Dialing { .. } => ConnectionState::Connecting,
            Slot::Connected(_) => ConnectionState::Connected,
        }
    }

    /// Number of dial attempts started so far.
    pub fn generation(&self) -> u64 {
        self.next_generation.load(Ordering::SeqCst)
    }

    /// Return the live connection, dialing one if needed.
    ///
    /// Idempotent while connected. Callers arriving during an attempt wait on
    /// that attempt instead of starting their own.
    pub async fn connect(&self) -> WsResult<Arc<Connection>> {
        let (generation, attempt) = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Connected(conn) => return Ok(Arc::clone(conn)),
                Slot::Dialing {
                    generation,
                    attempt,
                } => (*generation, attempt.clone()),
                Slot::Idle => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let attempt = self.dial(generation).shared();
                    *slot = Slot::Dialing {
                        generation,
                        attempt: attempt.clone(),
                    };
                    (generation, attempt)
                }
            }
        };

        let result = attempt.await;

        let mut slot = self.slot.lock();
        let still_dialing =
            matches!(&*slot, Slot::Dialing { generation: g, .. } if *g == generation);
        if still_dialing {
            *slot = match &result {
                Ok(conn) => Slot::Connected(Arc::clone(conn)),
                Err(_) => Slot::Idle,
            };
        }
        result
    }

    fn dial(&self, generation: u64) -> BoxFuture<'static, WsResult<Arc<Connection>>> {
        let dialer = Arc::clone(&self.dialer);
        let throttle = Arc::clone(&self.throttle);
        Box::pin(async move {
            throttle.acquire().await;
            info!(generation, endpoint = %dialer.endpoint(), "Connecting to websocket");

            match dialer.dial().await {
                Ok(transport) => {
                    info!(generation, "Websocket connected");
                    Ok(Arc::new(Connection::new(generation, transport)))
                }
                Err(e) => {
                    warn!(generation, error = %e, "Websocket connect failed");
                    Err(match e {
                        WsError::Connect(_) => e,
                        other => WsError::Connect(other.to_string()),
                    })
                }
            }
        })
    }

    /// Close the live connection, if any. A pending dial is left alone.
    pub async fn disconnect(&self) -> WsResult<()> {
        let conn = {
            let mut slot = self.slot.lock();
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Connected(conn) => Some(conn),
                other => {
                    *slot = other;
                    None
                }
            }
        };

        match conn {
            Some(conn) => {
                info!(generation = conn.generation, "Disconnecting websocket");
                conn.close().await
            }
            None => Ok(()),
        }
    }

    /// Drop the connection of `generation` if it is still the live one.
    async fn teardown(&self, generation: u64, cause: &WsError) {
        let conn = {
            let mut slot = self.slot.lock();
            match &*slot {
                Slot::Connected(conn) if conn.generation == generation => {
                    let conn = Arc::clone(conn);
                    *slot = Slot::Idle;
                    Some(conn)
                }
                _ => None,
            }
        };

        if let Some(conn) = conn {
            warn!(generation, error = %cause, "Tearing down websocket connection");
            if let Err(e) = conn.close().await {
                debug!(generation, error = %e, "Close after failure did not complete");
            }
        }
    }

    /// Serialize and send one subscription request.
    ///
    /// A write failure tears the connection down and is returned as `Send`.
    pub async fn send(&self, request: &SubscriptionRequest) -> WsResult<()> {
        let text = request.encode()?;
        let conn = self.connect().await?;
        debug!(generation = conn.generation, %text, "Sending request");

        match conn.send_text(text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = match e {
                    WsError::Send(_) => e,
                    other => WsError::Send(other.to_string()),
                };
                self.teardown(conn.generation, &err).await;
                Err(err)
            }
        }
    }

    /// Subscribe to a channel.
    pub async fn subscribe(&self, channel: &str) -> WsResult<()> {
        self.send(&SubscriptionRequest::subscribe(channel)).await
    }

    /// Unsubscribe from a channel.
    pub async fn unsubscribe(&self, channel: &str) -> WsResult<()> {
        self.send(&SubscriptionRequest::unsubscribe(channel)).await
    }

    /// Read and decode the next inbound envelope.
    ///
    /// Transport failures tear the connection down. Decode failures leave it
    /// intact.
    pub async fn receive(&self) -> WsResult<Envelope> {
        let conn = self.connect().await?;

        match conn.next_text().await {
            Ok(text) => Envelope::from_text(&text),
            Err(e) if e.is_transport() => {
                self.teardown(conn.generation, &e).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}
