//! Connection lifecycle state machine.
//!
//! ```text
//! idle ──► connecting ──► connected
//!              │              │
//!              ▼              ▼
//!          disconnected ◄─────┘
//!              │
//!              ▼
//!          reconnecting ──► connecting
//! ```
//!
//! The controller performs no I/O. The driver asks it what to do and applies the answer,
//! which keeps every transition observable and testable without a socket.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::backoff::ReconnectPolicy;
use super::heartbeat::LatencyWindow;
use crate::models::connection::{ConnectionState, ConnectionStatus};

/// Reason recorded when the local side closed the connection on purpose.
pub const CLIENT_DISCONNECT: &str = "io client disconnect";
/// Reason recorded when the server closes without saying why.
pub const SERVER_DISCONNECT: &str = "io server disconnect";
pub const OFFLINE: &str = "offline";
pub const UNMOUNTED: &str = "component-unmounted";

#[derive(Debug, Default)]
pub struct ConnectionController {
    state: ConnectionState,
    policy: ReconnectPolicy,
    latency: LatencyWindow,
    manual_disconnect: bool,
}

impl ConnectionController {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.status
    }

    pub fn is_manually_disconnected(&self) -> bool {
        self.manual_disconnect
    }

    fn transition(&mut self, to: ConnectionStatus) {
        debug!("Connection status {:?} -> {:?}", self.state.status, to);
        self.state.status = to;
    }

    /// `idle | reconnecting -> connecting`. Returns false if no attempt may be issued.
    pub fn begin_connect(&mut self) -> bool {
        if self.manual_disconnect {
            return false;
        }
        match self.state.status {
            ConnectionStatus::Idle | ConnectionStatus::Reconnecting => {
                self.transition(ConnectionStatus::Connecting);
                true
            }
            status => {
                debug!("Ignoring connect request while {:?}", status);
                false
            }
        }
    }

    /// `connecting -> connected`.
    pub fn connected(&mut self, socket_id: String, now: DateTime<Utc>) -> bool {
        if self.manual_disconnect || self.state.status != ConnectionStatus::Connecting {
            debug!("Ignoring connect success while {:?}", self.state.status);
            return false;
        }
        self.transition(ConnectionStatus::Connected);
        self.state.socket_id = Some(socket_id);
        self.state.reconnect_attempts = 0;
        self.state.error = None;
        self.state.last_connected_at = Some(now);
        true
    }

    pub fn set_socket_id(&mut self, socket_id: String) {
        if self.state.status == ConnectionStatus::Connected {
            self.state.socket_id = Some(socket_id);
        }
    }

    /// `connecting -> disconnected`. Returns whether a reconnect should be scheduled.
    pub fn connect_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.state.status != ConnectionStatus::Connecting {
            return false;
        }
        let reason = reason.into();
        self.transition(ConnectionStatus::Disconnected);
        let reconnect = self.should_reconnect(&reason);
        self.state.error = Some(reason);
        reconnect
    }

    /// `connected -> disconnected`. Returns whether a reconnect should be scheduled.
    pub fn disconnected(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> bool {
        if self.state.status != ConnectionStatus::Connected {
            return false;
        }
        let reason = reason.into();
        self.transition(ConnectionStatus::Disconnected);
        self.state.socket_id = None;
        self.state.last_disconnected_at = Some(now);
        let reconnect = self.should_reconnect(&reason);
        self.state.error = Some(reason);
        reconnect
    }

    fn should_reconnect(&self, reason: &str) -> bool {
        !self.manual_disconnect && reason != CLIENT_DISCONNECT
    }

    /// Moves to `reconnecting` and returns the backoff delay for the new attempt.
    pub fn schedule_reconnect(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if self.manual_disconnect || self.state.status == ConnectionStatus::Connected {
            return None;
        }
        self.state.reconnect_attempts = self.state.reconnect_attempts.saturating_add(1);
        self.state.last_attempt_at = Some(now);
        self.transition(ConnectionStatus::Reconnecting);
        Some(self.policy.delay(self.state.reconnect_attempts))
    }

    /// Reconnect without waiting, used when visibility or connectivity comes back.
    pub fn reconnect_now(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if self.manual_disconnect || self.state.status == ConnectionStatus::Connected {
            return None;
        }
        self.state.reconnect_attempts = self.state.reconnect_attempts.max(1);
        self.state.last_attempt_at = Some(now);
        self.transition(ConnectionStatus::Reconnecting);
        Some(Duration::ZERO)
    }

    /// Network loss. Marks the connection down without scheduling anything.
    pub fn went_offline(&mut self, now: DateTime<Utc>) {
        if self.manual_disconnect {
            return;
        }
        if self.state.status == ConnectionStatus::Connected {
            self.state.last_disconnected_at = Some(now);
        }
        self.transition(ConnectionStatus::Disconnected);
        self.state.socket_id = None;
        self.state.error = Some(OFFLINE.to_string());
    }

    /// Records a heartbeat acknowledgement and, if usable, its latency sample.
    pub fn heartbeat(&mut self, sample: Option<f64>, now: DateTime<Utc>) {
        self.state.last_heartbeat_at = Some(now);
        let Some(sample) = sample else {
            return;
        };
        if let Some(average) = self.latency.record(sample) {
            self.state.last_latency_ms = Some(sample);
            self.state.average_latency_ms = Some(average);
        }
    }

    /// Permanent shutdown for this session. Nothing reconnects afterwards.
    pub fn teardown(&mut self, now: DateTime<Utc>) {
        self.manual_disconnect = true;
        if self.state.status == ConnectionStatus::Connected {
            self.state.last_disconnected_at = Some(now);
        }
        self.transition(ConnectionStatus::Disconnected);
        self.state.socket_id = None;
        self.state.error = Some(UNMOUNTED.to_string());
    }
}
