//! Heartbeat monitoring for the feed connection.
//!
//! A ping is sent after `interval` of silence; if the pong does not arrive
//! within `timeout` the connection is considered dead and the listener
//! triggers reconnection.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct HeartbeatState {
    last_ping: Option<DateTime<Utc>>,
    last_message: DateTime<Utc>,
    waiting_for_pong: bool,
}

/// Heartbeat monitor. An interval of zero disables it.
pub struct HeartbeatMonitor {
    interval_ms: u64,
    timeout_ms: u64,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatMonitor {
    pub fn new(interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            interval_ms,
            timeout_ms,
            state: RwLock::new(HeartbeatState {
                last_ping: None,
                last_message: Utc::now(),
                waiting_for_pong: false,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_ms > 0
    }

    /// Reset state (called on every new session).
    pub fn reset(&self) {
        *self.state.write() = HeartbeatState {
            last_ping: None,
            last_message: Utc::now(),
            waiting_for_pong: false,
        };
    }

    pub fn record_ping(&self) {
        let mut state = self.state.write();
        state.last_ping = Some(Utc::now());
        state.waiting_for_pong = true;
    }

    pub fn record_pong(&self) {
        let now = Utc::now();
        let mut state = self.state.write();
        state.waiting_for_pong = false;
        state.last_message = now;

        if let Some(ping_time) = state.last_ping {
            let rtt_ms = (now - ping_time).num_milliseconds();
            debug!(rtt_ms, "Received pong");
        }
    }

    /// Any inbound frame counts as liveness.
    pub fn record_message(&self) {
        self.state.write().last_message = Utc::now();
    }

    pub fn is_timed_out(&self) -> bool {
        let state = self.state.read();
        if !state.waiting_for_pong {
            return false;
        }
        state
            .last_ping
            .is_some_and(|t| (Utc::now() - t).num_milliseconds() > self.timeout_ms as i64)
    }

    pub fn time_since_last_message_ms(&self) -> i64 {
        (Utc::now() - self.state.read().last_message).num_milliseconds()
    }

    pub fn should_send_heartbeat(&self) -> bool {
        if !self.is_enabled() || self.state.read().waiting_for_pong {
            return false;
        }
        self.time_since_last_message_ms() >= self.interval_ms as i64
    }

    /// Wait for the next check. Never resolves when disabled.
    pub async fn wait_for_check(&self) {
        if !self.is_enabled() {
            std::future::pending::<()>().await;
        }
        let period = (self.interval_ms / 2).min(self.timeout_ms.max(1));
        tokio::time::sleep(Duration::from_millis(period.max(1))).await;
    }
}
