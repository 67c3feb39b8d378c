//! Prometheus metrics for the trade pipeline.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means duplicate
//! metric names, which is a programming error and should crash at first use.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, GaugeVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};

/// Connect attempts by outcome (ok/error).
pub static WS_CONNECT_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_ws_connect_attempts_total",
        "Websocket connect attempts by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Connection state (1 on the active state label, 0 elsewhere).
pub static WS_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "tape_ws_state",
        "Websocket connection state (1=active)",
        &["state"]
    )
    .unwrap()
});

/// Transport failures by kind (connect/send/receive/closed).
pub static WS_TRANSPORT_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_ws_transport_errors_total",
        "Websocket transport failures by kind",
        &["kind"]
    )
    .unwrap()
});

/// Envelopes fanned out by the bus, by event.
pub static ENVELOPES_DISPATCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_bus_envelopes_dispatched_total",
        "Envelopes dispatched to subscribers",
        &["event"]
    )
    .unwrap()
});

/// Registered bus subscribers.
pub static BUS_SUBSCRIBERS: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("tape_bus_subscribers", "Registered subscribers").unwrap());

/// Decode failures by stage (envelope/trade).
pub static DECODE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_decode_errors_total",
        "Messages that failed to decode",
        &["stage"]
    )
    .unwrap()
});

/// Trades emitted by the merge stage, by source (backlog/live).
pub static TRADES_EMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_trades_emitted_total",
        "Trades emitted by the merged stream",
        &["source"]
    )
    .unwrap()
});

/// Live trades suppressed at the backlog/live seam.
pub static SEAM_DUPLICATES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tape_seam_duplicates_total",
        "Live trades suppressed as seam duplicates"
    )
    .unwrap()
});

/// Id regressions seen by the sequence monitor, by source.
pub static SEQUENCE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_sequence_errors_total",
        "Trade id regressions or duplicates",
        &["source"]
    )
    .unwrap()
});

/// Alarms fired, by direction.
pub static ALARMS_TRIGGERED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_alarms_triggered_total",
        "Alarms triggered",
        &["direction"]
    )
    .unwrap()
});

/// Alarm command runs by outcome (ok/failed/throttled).
pub static ALARM_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "tape_alarm_commands_total",
        "Alarm notification commands",
        &["outcome"]
    )
    .unwrap()
});

/// Last observed price and VWAPs, by series (last/short/long).
pub static PRICE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!("tape_price", "Last price and VWAP values", &["series"]).unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record a connect attempt.
    pub fn ws_connect_attempt(ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        WS_CONNECT_ATTEMPTS.with_label_values(&[outcome]).inc();
    }

    /// Set the connection state. Only the active state is 1.
    pub fn ws_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected"] {
            WS_STATE.with_label_values(&[s]).set(0);
        }
        WS_STATE.with_label_values(&[state]).set(1);
    }

    /// Record a transport failure.
    pub fn ws_transport_error(kind: &str) {
        WS_TRANSPORT_ERRORS.with_label_values(&[kind]).inc();
    }

    /// Record one dispatched envelope.
    pub fn envelope_dispatched(event: &str) {
        ENVELOPES_DISPATCHED.with_label_values(&[event]).inc();
    }

    pub fn bus_subscribers_set(count: usize) {
        BUS_SUBSCRIBERS.set(count as i64);
    }

    /// Record a decode failure.
    pub fn decode_error(stage: &str) {
        DECODE_ERRORS.with_label_values(&[stage]).inc();
    }

    /// Record an emitted trade.
    pub fn trade_emitted(source: &str) {
        TRADES_EMITTED.with_label_values(&[source]).inc();
    }

    pub fn seam_duplicate() {
        SEAM_DUPLICATES.inc();
    }

    pub fn sequence_error(source: &str) {
        SEQUENCE_ERRORS.with_label_values(&[source]).inc();
    }

    /// Record a fired alarm.
    pub fn alarm_triggered(direction: &str) {
        ALARMS_TRIGGERED.with_label_values(&[direction]).inc();
    }

    /// Record an alarm command outcome.
    pub fn alarm_command(outcome: &str) {
        ALARM_COMMANDS.with_label_values(&[outcome]).inc();
    }

    /// Set a price series value.
    pub fn price_set(series: &str, value: f64) {
        PRICE.with_label_values(&[series]).set(value);
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}
