//! Websocket client for the trade feed.
//!
//! Provides:
//! - A lazily-connecting connection manager with shared connect attempts
//! - Reconnect throttling (minimum interval between dials)
//! - The subscribe/unsubscribe request codec and the inbound envelope decoder

pub mod connection;
pub mod error;
pub mod message;
pub mod throttle;
pub mod transport;

pub use connection::{
    Connection, ConnectionConfig, ConnectionManager, ConnectionState, DEFAULT_WS_URL,
};
pub use error::{WsError, WsResult};
pub use message::{
    ChannelRef, Envelope, EventKind, LiveTradePayload, SubscriptionIntent, SubscriptionRequest,
    Topic,
};
pub use throttle::ReconnectThrottle;
pub use transport::{
    BoxFuture, Dialer, FrameSink, FrameSource, MockDialer, MockPeer, Transport, TungsteniteDialer,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any websocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
