//! Feed error types.

use tape_core::TradeSource;
use tape_history::HistoryError;
use tape_ws::WsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    /// Live channel failed (connect, send, receive).
    #[error("Transport error: {0}")]
    Transport(#[from] WsError),

    /// Backlog REST call failed.
    #[error("History fetch failed: {0}")]
    HistoryFetch(#[from] HistoryError),

    /// Trade id did not advance within one source.
    #[error("Sequence error ({origin}): id {id} after {previous}")]
    Sequence {
        origin: TradeSource,
        previous: u64,
        id: u64,
    },

    /// Subscription queue closed underneath the stream.
    #[error("Feed closed")]
    Closed,
}

pub type FeedResult<T> = Result<T, FeedError>;
