use serde::Serialize;
use std::collections::VecDeque;

use crate::models::events::{
    BlockTick, ChatMessage, CommentEvent, MarketUpdate, MemoEvent, NotificationEvent,
    TransactionAlert,
};

pub const DEFAULT_FEED_CAPACITY: usize = 200;

/// Items that carry a stable identity for deduplication.
pub trait FeedItem: Clone {
    type Key: PartialEq;

    fn key(&self) -> Self::Key;
}

impl FeedItem for MemoEvent {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl FeedItem for BlockTick {
    type Key = u64;

    fn key(&self) -> u64 {
        self.number
    }
}

impl FeedItem for MarketUpdate {
    type Key = String;

    fn key(&self) -> String {
        self.market_id.clone()
    }
}

impl FeedItem for TransactionAlert {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl FeedItem for CommentEvent {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl FeedItem for ChatMessage {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl FeedItem for NotificationEvent {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Newest-first list with bounded retention. A repeated key replaces the older copy.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct BoundedFeed<T> {
    items: VecDeque<T>,
    #[serde(skip)]
    capacity: usize,
}

impl<T: FeedItem> BoundedFeed<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, item: T) {
        let key = item.key();
        self.items.retain(|existing| existing.key() != key);
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    pub fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.items.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
