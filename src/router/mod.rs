//! Inbound event routing.
//!
//! Each typed event has exactly one home in the [`FeedStore`]. The raw envelope is also
//! offered to the [`ListenerTable`], which is how plugins and other ad-hoc consumers see
//! traffic, including events this crate has no type for.

pub mod feed;
pub mod listeners;
pub mod window;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{str::FromStr, sync::Arc};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::models::events::{
    BlockTick, ChatMessage, CommentEvent, Envelope, MarketUpdate, MemoEvent, NotificationEvent,
    ServerEvent, TransactionAlert,
};
pub use feed::{BoundedFeed, DEFAULT_FEED_CAPACITY, FeedItem};
pub use listeners::{Listener, ListenerId, ListenerTable};
pub use window::{DEFAULT_ALERT_WINDOW_SECS, RecentWindow, Timestamped};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Memos,
    Blocks,
    Markets,
    Transactions,
    Alerts,
    Comments,
    Chat,
    Notifications,
}

impl FromStr for FeedKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memos" => Ok(Self::Memos),
            "blocks" => Ok(Self::Blocks),
            "markets" => Ok(Self::Markets),
            "transactions" => Ok(Self::Transactions),
            "alerts" => Ok(Self::Alerts),
            "comments" => Ok(Self::Comments),
            "chat" => Ok(Self::Chat),
            "notifications" => Ok(Self::Notifications),
            other => Err(format!("unknown feed '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStore {
    pub memos: BoundedFeed<MemoEvent>,
    pub blocks: BoundedFeed<BlockTick>,
    pub markets: BoundedFeed<MarketUpdate>,
    pub transactions: BoundedFeed<TransactionAlert>,
    pub recent_alerts: RecentWindow<TransactionAlert>,
    pub comments: BoundedFeed<CommentEvent>,
    pub chat: BoundedFeed<ChatMessage>,
    pub notifications: BoundedFeed<NotificationEvent>,
}

impl Default for FeedStore {
    fn default() -> Self {
        Self::new(
            DEFAULT_FEED_CAPACITY,
            Duration::seconds(DEFAULT_ALERT_WINDOW_SECS),
        )
    }
}

impl FeedStore {
    pub fn new(capacity: usize, alert_window: Duration) -> Self {
        Self {
            memos: BoundedFeed::new(capacity),
            blocks: BoundedFeed::new(capacity),
            markets: BoundedFeed::new(capacity),
            transactions: BoundedFeed::new(capacity),
            recent_alerts: RecentWindow::new(alert_window, capacity),
            comments: BoundedFeed::new(capacity),
            chat: BoundedFeed::new(capacity),
            notifications: BoundedFeed::new(capacity),
        }
    }

    /// Stores a payload event in its feed. Control and unknown events are not stored.
    pub fn apply(&mut self, event: ServerEvent, now: DateTime<Utc>) -> bool {
        match event {
            ServerEvent::Memo(memo) => self.memos.push(memo),
            ServerEvent::Block(block) => self.blocks.push(block),
            ServerEvent::Market(market) => self.markets.push(market),
            ServerEvent::Transaction(alert) => {
                self.recent_alerts.push(alert.clone(), now);
                self.transactions.push(alert);
            }
            ServerEvent::Comment(comment) => self.comments.push(comment),
            ServerEvent::Chat(message) => self.chat.push(message),
            ServerEvent::Notification(notification) => self.notifications.push(notification),
            ServerEvent::HeartbeatAck(_)
            | ServerEvent::Session(_)
            | ServerEvent::Disconnect(_)
            | ServerEvent::Unknown(_) => return false,
        }
        true
    }

    pub fn latest_block(&self) -> Option<&BlockTick> {
        self.blocks.latest()
    }

    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        self.recent_alerts.prune(now)
    }

    pub fn recent(&self, kind: FeedKind, limit: usize) -> crate::error::Result<Value> {
        let value = match kind {
            FeedKind::Memos => serde_json::to_value(self.memos.recent(limit))?,
            FeedKind::Blocks => serde_json::to_value(self.blocks.recent(limit))?,
            FeedKind::Markets => serde_json::to_value(self.markets.recent(limit))?,
            FeedKind::Transactions => serde_json::to_value(self.transactions.recent(limit))?,
            FeedKind::Alerts => serde_json::to_value(self.recent_alerts.recent(limit))?,
            FeedKind::Comments => serde_json::to_value(self.comments.recent(limit))?,
            FeedKind::Chat => serde_json::to_value(self.chat.recent(limit))?,
            FeedKind::Notifications => serde_json::to_value(self.notifications.recent(limit))?,
        };
        Ok(value)
    }

    pub fn clear(&mut self) {
        self.memos.clear();
        self.blocks.clear();
        self.markets.clear();
        self.transactions.clear();
        self.recent_alerts.clear();
        self.comments.clear();
        self.chat.clear();
        self.notifications.clear();
    }
}

pub type Feeds = Arc<RwLock<FeedStore>>;
pub type Listeners = Arc<RwLock<ListenerTable>>;

/// Fans inbound envelopes out to listeners and feeds, in arrival order.
#[derive(Clone)]
pub struct EventRouter {
    feeds: Feeds,
    listeners: Listeners,
}

impl EventRouter {
    pub fn new(feeds: Feeds, listeners: Listeners) -> Self {
        Self { feeds, listeners }
    }

    pub fn feeds(&self) -> &Feeds {
        &self.feeds
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Routes one decoded envelope. Returns the decoded event, or `None` when the payload
    /// failed validation (listeners still see the raw data).
    pub async fn route(&self, envelope: &Envelope, now: DateTime<Utc>) -> Option<ServerEvent> {
        let invoked = self
            .listeners
            .write()
            .await
            .emit(&envelope.event, &envelope.data);
        if invoked > 0 {
            debug!("Delivered '{}' to {} listeners", envelope.event, invoked);
        }

        let event = match ServerEvent::from_envelope(envelope) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping inbound event: {}", e);
                return None;
            }
        };

        if self.feeds.write().await.apply(event.clone(), now) {
            debug!("Stored '{}' event", envelope.event);
        }
        Some(event)
    }

    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        self.feeds.write().await.prune(now)
    }
}
