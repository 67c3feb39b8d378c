//! Physical transport behind the connection manager.
//!
//! A [`Dialer`] opens one physical connection and hands back its two halves:
//! a [`FrameSink`] for outbound text frames and a [`FrameSource`] for inbound
//! ones. The production dialer speaks websocket through tokio-tungstenite;
//! [`MockDialer`] provides an in-memory transport for tests.

use crate::error::{WsError, WsResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

pub use tape_core::BoxFuture;

/// Outbound half of a physical connection.
pub trait FrameSink: Send {
    /// Send one text frame.
    fn send_text(&mut self, text: String) -> BoxFuture<'_, WsResult<()>>;

    /// Close the connection politely.
    fn close(&mut self) -> BoxFuture<'_, WsResult<()>>;
}

/// Inbound half of a physical connection.
pub trait FrameSource: Send {
    /// Wait for the next text frame.
    ///
    /// Control frames are handled internally. End of stream and transport
    /// failures surface as `Receive` / `Closed` errors.
    fn next_text(&mut self) -> BoxFuture<'_, WsResult<String>>;
}

/// Both halves of one physical connection.
pub struct Transport {
    pub sink: Box<dyn FrameSink>,
    pub source: Box<dyn FrameSource>,
}

/// Opens physical connections.
pub trait Dialer: Send + Sync {
    /// Open a new connection. Failures are reported as `WsError::Connect`.
    fn dial(&self) -> BoxFuture<'_, WsResult<Transport>>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

// ============================================================================
// tokio-tungstenite
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket dialer.
#[derive(Debug, Clone)]
pub struct TungsteniteDialer {
    url: String,
}

impl TungsteniteDialer {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Dialer for TungsteniteDialer {
    fn dial(&self) -> BoxFuture<'_, WsResult<Transport>> {
        Box::pin(async move {
            // TCP_NODELAY: trades are small and latency sensitive
            let (stream, _response) = connect_async_tls_with_config(&self.url, None, true, None)
                .await
                .map_err(|e| WsError::Connect(e.to_string()))?;
            let (write, read) = stream.split();
            Ok(Transport {
                sink: Box::new(TungsteniteSink(write)),
                source: Box::new(TungsteniteSource(read)),
            })
        })
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

struct TungsteniteSink(SplitSink<WsStream, Message>);

impl FrameSink for TungsteniteSink {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            self.0
                .send(Message::Text(text))
                .await
                .map_err(|e| WsError::Send(e.to_string()))
        })
    }

    fn close(&mut self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async move {
            self.0
                .send(Message::Close(None))
                .await
                .map_err(|e| WsError::Send(e.to_string()))
        })
    }
}

struct TungsteniteSource(SplitStream<WsStream>);

impl FrameSource for TungsteniteSource {
    fn next_text(&mut self) -> BoxFuture<'_, WsResult<String>> {
        Box::pin(async move {
            loop {
                match self.0.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(text),
                    Some(Ok(Message::Binary(bytes))) => {
                        return String::from_utf8(bytes)
                            .map_err(|e| WsError::Decode(format!("binary frame: {e}")));
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite queues the pong and flushes it on the next read
                        debug!("Received ping");
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(code, %reason, "Websocket closed by server");
                        return Err(WsError::Closed { code, reason });
                    }
                    Some(Err(e)) => return Err(WsError::Receive(e.to_string())),
                    None => return Err(WsError::Receive("stream ended".to_string())),
                }
            }
        })
    }
}

// ============================================================================
// In-memory transport
// ============================================================================

/// Server side of one mock connection.
pub struct MockPeer {
    /// Connection generation order (1 for the first dial).
    pub index: u64,
    /// Frames the client sent.
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Push frames (or failures) to the client.
    pub inbound: mpsc::UnboundedSender<WsResult<String>>,
}

impl MockPeer {
    /// Deliver a text frame to the client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.inbound.send(Ok(text.into()));
    }

    /// Make the client's next read fail.
    pub fn fail(&self, error: WsError) {
        let _ = self.inbound.send(Err(error));
    }
}

/// In-memory dialer for tests.
///
/// Every successful dial creates a fresh channel pair and announces the
/// server side on the peer channel returned by [`MockDialer::new`].
pub struct MockDialer {
    dials: AtomicU64,
    refuse: AtomicU32,
    delay: Duration,
    peers: mpsc::UnboundedSender<MockPeer>,
}

impl MockDialer {
    /// Create a dialer plus the receiver on which new peers appear.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        Self::with_delay(Duration::ZERO)
    }

    /// Same as [`MockDialer::new`] with a simulated handshake time.
    pub fn with_delay(delay: Duration) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                dials: AtomicU64::new(0),
                refuse: AtomicU32::new(0),
                delay,
                peers,
            },
            rx,
        )
    }

    /// Refuse the next `n` dials.
    pub fn refuse_next(&self, n: u32) {
        self.refuse.store(n, Ordering::SeqCst);
    }

    /// Number of dials attempted so far.
    pub fn dial_count(&self) -> u64 {
        self.dials.load(Ordering::SeqCst)
    }
}

impl Dialer for MockDialer {
    fn dial(&self) -> BoxFuture<'_, WsResult<Transport>> {
        Box::pin(async move {
            let index = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let refused = self
                .refuse
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if refused {
                return Err(WsError::Connect("mock endpoint refused".to_string()));
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            self.peers
                .send(MockPeer {
                    index,
                    outbound: out_rx,
                    inbound: in_tx,
                })
                .map_err(|_| WsError::Connect("mock peer receiver dropped".to_string()))?;

            Ok(Transport {
                sink: Box::new(MockSink(out_tx)),
                source: Box::new(MockSource(in_rx)),
            })
        })
    }

    fn endpoint(&self) -> &str {
        "mock://feed"
    }
}

struct MockSink(mpsc::UnboundedSender<String>);

impl FrameSink for MockSink {
    fn send_text(&mut self, text: String) -> BoxFuture<'_, WsResult<()>> {
        let result = self
            .0
            .send(text)
            .map_err(|_| WsError::Send("mock peer dropped".to_string()));
        Box::pin(async move { result })
    }

    fn close(&mut self) -> BoxFuture<'_, WsResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct MockSource(mpsc::UnboundedReceiver<WsResult<String>>);

impl FrameSource for MockSource {
    fn next_text(&mut self) -> BoxFuture<'_, WsResult<String>> {
        Box::pin(async move {
            match self.0.recv().await {
                Some(frame) => frame,
                None => Err(WsError::Receive("mock peer dropped".to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_dialer_round_trip() {
        let (dialer, mut peers) = MockDialer::new();
        let mut transport = dialer.dial().await.unwrap();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.index, 1);

        transport.sink.send_text("hello".to_string()).await.unwrap();
        assert_eq!(peer.outbound.recv().await.unwrap(), "hello");

        peer.push("world");
        assert_eq!(transport.source.next_text().await.unwrap(), "world");

        drop(peer);
        assert!(matches!(
            transport.source.next_text().await,
            Err(WsError::Receive(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_dialer_refuses() {
        let (dialer, _peers) = MockDialer::new();
        dialer.refuse_next(1);
        assert!(matches!(dialer.dial().await, Err(WsError::Connect(_))));
        assert!(dialer.dial().await.is_ok());
        assert_eq!(dialer.dial_count(), 2);
    }
}
