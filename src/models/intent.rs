use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::utils::id_generator::{REGISTRATION_ID_LEN, mini_id};

/// Stable identifier for one logical subscriber (one per mounted consumer).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(Arc<str>);

impl RegistrationId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn generate() -> Self {
        Self(mini_id(REGISTRATION_ID_LEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegistrationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketsIntent {
    #[serde(default, skip_serializing_if = "is_false")]
    pub all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markets: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemosIntent {
    #[serde(default, skip_serializing_if = "is_false")]
    pub all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentsIntent {
    pub resource_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
}

/// What one consumer wants the server to push. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markets: Option<MarketsIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<TransactionsIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memos: Option<MemosIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<CommentsIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationsIntent>,
}

impl SubscriptionIntent {
    pub fn all_markets() -> Self {
        Self {
            markets: Some(MarketsIntent {
                all: true,
                markets: Vec::new(),
            }),
            ..Self::default()
        }
    }

    pub fn markets<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markets: Some(MarketsIntent {
                all: false,
                markets: ids.into_iter().map(Into::into).collect(),
            }),
            ..Self::default()
        }
    }

    pub fn transactions(min_amount: Option<f64>, addresses: Vec<String>) -> Self {
        Self {
            transactions: Some(TransactionsIntent {
                min_amount,
                addresses,
            }),
            ..Self::default()
        }
    }

    pub fn all_memos() -> Self {
        Self {
            memos: Some(MemosIntent { all: true }),
            ..Self::default()
        }
    }

    pub fn comment_thread(resource_id: impl Into<String>) -> Self {
        Self {
            comments: Some(CommentsIntent {
                resource_id: resource_id.into(),
            }),
            ..Self::default()
        }
    }
}

/// The single aggregate payload sent with `subscribe`.
///
/// Comment threads are deliberately absent: each thread is subscribed on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedSubscription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markets: Option<MarketsIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<TransactionsIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memos: Option<MemosIntent>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub chat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationsIntent>,
}

impl MergedSubscription {
    pub fn is_empty(&self) -> bool {
        self.markets.is_none()
            && self.transactions.is_none()
            && self.memos.is_none()
            && !self.chat
            && self.notifications.is_none()
    }
}

/// Payload of the per-thread `subscribe` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSubscription {
    pub comments: CommentsIntent,
}

impl ThreadSubscription {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            comments: CommentsIntent {
                resource_id: resource_id.into(),
            },
        }
    }
}
