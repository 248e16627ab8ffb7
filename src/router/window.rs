use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::feed::{BoundedFeed, FeedItem};
use crate::models::events::TransactionAlert;

pub const DEFAULT_ALERT_WINDOW_SECS: i64 = 120;

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for TransactionAlert {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A feed that only holds items younger than `window`.
///
/// Eviction happens on [`prune`](Self::prune), which the prune tick calls periodically, so
/// items age out even when nothing new arrives.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct RecentWindow<T> {
    feed: BoundedFeed<T>,
    #[serde(skip)]
    window: Duration,
}

impl<T: FeedItem + Timestamped> RecentWindow<T> {
    pub fn new(window: Duration, capacity: usize) -> Self {
        Self {
            feed: BoundedFeed::new(capacity),
            window,
        }
    }

    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Adds an item unless it is already outside the window.
    pub fn push(&mut self, item: T, now: DateTime<Utc>) {
        if item.timestamp() >= self.cutoff(now) {
            self.feed.push(item);
        }
    }

    /// Drops everything older than the window. Returns how many items were evicted.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let before = self.feed.len();
        self.feed.retain(|item| item.timestamp() >= cutoff);
        before - self.feed.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.feed.iter()
    }

    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.feed.recent(limit)
    }

    pub fn len(&self) -> usize {
        self.feed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.is_empty()
    }

    pub fn clear(&mut self) {
        self.feed.clear();
    }
}
