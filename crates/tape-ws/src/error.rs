//! Websocket error types.
//!
//! Every variant carries owned strings so the error is `Clone`: a connect
//! attempt shared by several callers hands the same failure to each of them.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WsError {
    /// Endpoint unreachable or handshake failed.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Writing to an established connection failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Reading from an established connection failed.
    #[error("Receive failed: {0}")]
    Receive(String),

    /// Server closed the connection.
    #[error("Connection closed: code={code}, reason={reason}")]
    Closed { code: u16, reason: String },

    /// Inbound message could not be decoded. Not fatal to the connection.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outbound message could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),
}

impl WsError {
    /// Whether the error tore the connection down.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Send(_) | Self::Receive(_) | Self::Closed { .. }
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;
