//! Wire envelopes and the typed payloads pushed by the realtime server.
//!
//! Every frame is a JSON text message of the form `{"event": "...", "data": ...}`.
//! Inbound frames are decoded into [`ServerEvent`] before anything else sees them, so
//! handlers only ever work with validated payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RealtimeError, Result};

pub const SUBSCRIBE: &str = "subscribe";
pub const UNSUBSCRIBE: &str = "unsubscribe";
pub const HEARTBEAT: &str = "heartbeat";
pub const HEARTBEAT_ACK: &str = "heartbeat:ack";
pub const SESSION: &str = "session";
pub const DISCONNECT: &str = "disconnect";
pub const MEMO_NEW: &str = "memo:new";
pub const BLOCK_NEW: &str = "block:new";
pub const MARKET_UPDATE: &str = "market:update";
pub const TRANSACTION_ALERT: &str = "transaction:alert";
pub const COMMENT_NEW: &str = "comment:new";
pub const CHAT_MESSAGE: &str = "chat:message";
pub const NOTIFICATION_NEW: &str = "notification:new";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn encode<T: Serialize>(event: &str, data: &T) -> Result<String> {
        Ok(serde_json::to_string(&Self::new(event, serde_json::to_value(data)?))?)
    }

    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoEvent {
    pub id: String,
    pub tx_id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub memo: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTick {
    pub number: u64,
    pub hash: String,
    pub tx_count: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketUpdate {
    pub market_id: String,
    pub name: String,
    #[serde(default)]
    pub energy_price_sun: Option<f64>,
    #[serde(default)]
    pub available_energy: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionAlert {
    pub id: String,
    pub from: String,
    pub to: String,
    pub amount: f64,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub market_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    pub id: String,
    pub resource_id: String,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub author: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub wallet: String,
    pub channel: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Server reply to a client `heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    #[serde(default)]
    pub latency_ms: Option<f64>,
    /// Echo of the client's `sentAt` (epoch millis).
    #[serde(default)]
    pub sent_at: Option<i64>,
}

impl HeartbeatAck {
    /// Latency reported by the server, or the locally measured round trip when only the
    /// echo is present.
    pub fn sample(&self, now: DateTime<Utc>) -> Option<f64> {
        self.latency_ms.or_else(|| {
            self.sent_at
                .map(|sent_at| (now.timestamp_millis() - sent_at) as f64)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPing {
    pub sent_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub socket_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Closed set of inbound events.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    HeartbeatAck(HeartbeatAck),
    Session(SessionInfo),
    Disconnect(DisconnectNotice),
    Memo(MemoEvent),
    Block(BlockTick),
    Market(MarketUpdate),
    Transaction(TransactionAlert),
    Comment(CommentEvent),
    Chat(ChatMessage),
    Notification(NotificationEvent),
    /// Anything else, e.g. plugin-namespaced traffic. Only listeners see these.
    Unknown(Envelope),
}

fn payload<T: for<'de> Deserialize<'de>>(envelope: &Envelope) -> Result<T> {
    serde_json::from_value(envelope.data.clone()).map_err(|source| {
        RealtimeError::InvalidPayload {
            event: envelope.event.clone(),
            source,
        }
    })
}

impl ServerEvent {
    pub fn from_envelope(envelope: &Envelope) -> Result<Self> {
        let event = match envelope.event.as_str() {
            HEARTBEAT_ACK => {
                // A bare ack with no body still counts as a heartbeat.
                if envelope.data.is_null() {
                    Self::HeartbeatAck(HeartbeatAck::default())
                } else {
                    Self::HeartbeatAck(payload(envelope)?)
                }
            }
            SESSION => Self::Session(payload(envelope)?),
            DISCONNECT => {
                if envelope.data.is_null() {
                    Self::Disconnect(DisconnectNotice::default())
                } else {
                    Self::Disconnect(payload(envelope)?)
                }
            }
            MEMO_NEW => Self::Memo(payload(envelope)?),
            BLOCK_NEW => Self::Block(payload(envelope)?),
            MARKET_UPDATE => Self::Market(payload(envelope)?),
            TRANSACTION_ALERT => Self::Transaction(payload(envelope)?),
            COMMENT_NEW => Self::Comment(payload(envelope)?),
            CHAT_MESSAGE => Self::Chat(payload(envelope)?),
            NOTIFICATION_NEW => Self::Notification(payload(envelope)?),
            _ => Self::Unknown(envelope.clone()),
        };
        Ok(event)
    }
}
