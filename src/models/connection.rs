use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

/// How degraded connectivity should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTone {
    Idle,
    Connecting,
    Live,
    Reconnecting,
    Offline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub socket_id: Option<String>,
    pub reconnect_attempts: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
    pub last_disconnected_at: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<f64>,
    pub average_latency_ms: Option<f64>,
    pub error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn tone(&self) -> ConnectionTone {
        match self.status {
            ConnectionStatus::Idle => ConnectionTone::Idle,
            ConnectionStatus::Connecting => ConnectionTone::Connecting,
            ConnectionStatus::Connected => ConnectionTone::Live,
            ConnectionStatus::Reconnecting => ConnectionTone::Reconnecting,
            ConnectionStatus::Disconnected => ConnectionTone::Offline,
        }
    }
}

/// Environment changes that can wake a sleeping connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// The host became visible again.
    Visible,
    /// Network connectivity came back.
    Online,
    /// Network connectivity was lost.
    Offline,
}
