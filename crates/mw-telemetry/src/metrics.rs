//! Prometheus metrics for marketwatch.
//!
//! Covers:
//! - Feed connection state and reconnects
//! - Price updates by source
//! - Alerts fired
//! - Handler and poll chunk failures
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure (duplicate
//! metric names) is a startup configuration error and only happens during
//! static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge, register_gauge_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Gauge, GaugeVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};

/// Feed connection state (1 = connected).
pub static FEED_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("mw_feed_connected", "Feed connection state (1=connected)").unwrap()
});

/// Feed client state machine.
/// Labels: state (disconnected/connecting/connected/authenticating/listening/reconnecting/failed)
pub static FEED_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "mw_feed_state",
        "Feed client current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static FEED_RECONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("mw_feed_reconnects_total", "Total feed reconnect attempts").unwrap()
});

/// Labels: source (feed/poll/manual)
pub static PRICE_UPDATES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mw_price_updates_total",
        "Total applied price changes",
        &["source"]
    )
    .unwrap()
});

/// Labels: condition (below/above)
pub static ALERTS_FIRED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mw_alerts_fired_total",
        "Total price alerts fired",
        &["condition"]
    )
    .unwrap()
});

pub static HANDLER_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "mw_handler_failures_total",
        "Total change/alert handler failures (errors and panics)"
    )
    .unwrap()
});

/// Labels: reason (rate_limited/http/status/invalid_response)
pub static POLL_CHUNK_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mw_poll_chunk_failures_total",
        "Total failed poll chunks",
        &["reason"]
    )
    .unwrap()
});

pub static WATCHED_ITEMS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("mw_watched_items", "Number of watched items").unwrap()
});

/// Labels: state (armed/triggered)
pub static ALERT_RULES: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!("mw_alert_rules", "Registered alert rules", &["state"]).unwrap()
});

const FEED_STATES: [&str; 7] = [
    "disconnected",
    "connecting",
    "connected",
    "authenticating",
    "listening",
    "reconnecting",
    "failed",
];

/// Stateless facade over the metric statics.
pub struct Metrics;

impl Metrics {
    pub fn feed_connected(connected: bool) {
        FEED_CONNECTED.set(if connected { 1.0 } else { 0.0 });
    }

    /// Set the active feed state to 1 and every other state to 0.
    pub fn feed_state_set(state: &str) {
        for s in &FEED_STATES {
            FEED_STATE.with_label_values(&[s]).set(0.0);
        }
        FEED_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn feed_reconnect() {
        FEED_RECONNECTS_TOTAL.inc();
    }

    pub fn price_update(source: &str) {
        PRICE_UPDATES_TOTAL.with_label_values(&[source]).inc();
    }

    pub fn alert_fired(condition: &str) {
        ALERTS_FIRED_TOTAL.with_label_values(&[condition]).inc();
    }

    pub fn handler_failures(count: u64) {
        HANDLER_FAILURES_TOTAL.inc_by(count);
    }

    pub fn poll_chunk_failures(reason: &str, count: u64) {
        POLL_CHUNK_FAILURES_TOTAL
            .with_label_values(&[reason])
            .inc_by(count);
    }

    pub fn watched_items(count: usize) {
        WATCHED_ITEMS.set(count as i64);
    }

    pub fn alert_rules(armed: usize, triggered: usize) {
        ALERT_RULES.with_label_values(&["armed"]).set(armed as i64);
        ALERT_RULES
            .with_label_values(&["triggered"])
            .set(triggered as i64);
    }
}
