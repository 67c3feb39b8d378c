//! Integration tests for tape-feed.
//!
//! These run the pipeline against an in-process websocket server:
//! - Backlog/live merge over a real socket
//! - Stream termination and reader redial when the server drops the link

pub mod common;
