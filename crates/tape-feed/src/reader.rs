//! Reader loop: the single writer of envelopes into the bus.

use crate::bus::EventBus;
use std::sync::Arc;
use tape_telemetry::Metrics;
use tape_ws::{ConnectionManager, WsError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pump `receive()` into `dispatch()` until cancelled.
///
/// Decode failures are logged and dropped. Transport failures are handed to
/// every subscriber so their streams end; the loop then keeps going and the
/// next `receive()` redials through the reconnect throttle.
pub async fn run_reader(
    connection: Arc<ConnectionManager>,
    bus: Arc<EventBus>,
    shutdown: CancellationToken,
) {
    info!("Feed reader started");
    let mut generation = connection.generation();

    loop {
        let result = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            result = connection.receive() => result,
        };

        if connection.generation() != generation {
            generation = connection.generation();
            Metrics::ws_connect_attempt(!matches!(result, Err(WsError::Connect(_))));
        }
        Metrics::ws_state_set(connection.state().as_str());

        match result {
            Ok(envelope) => {
                debug!(
                    channel = envelope.channel(),
                    event = envelope.event(),
                    "Envelope received"
                );
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = bus.dispatch(envelope) => {}
                }
            }
            Err(WsError::Decode(reason)) => {
                Metrics::decode_error("envelope");
                warn!(%reason, "Dropping undecodable message");
            }
            Err(e) => {
                Metrics::ws_transport_error(transport_kind(&e));
                warn!(error = %e, "Feed transport failed");
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = bus.dispatch_error(e) => {}
                }
            }
        }
    }

    if let Err(e) = connection.disconnect().await {
        debug!(error = %e, "Disconnect on shutdown failed");
    }
    Metrics::ws_state_set(connection.state().as_str());
    info!("Feed reader stopped");
}

fn transport_kind(error: &WsError) -> &'static str {
    match error {
        WsError::Connect(_) => "connect",
        WsError::Send(_) => "send",
        WsError::Receive(_) => "receive",
        WsError::Closed { .. } => "closed",
        WsError::Decode(_) => "decode",
        WsError::Encode(_) => "encode",
    }
}
