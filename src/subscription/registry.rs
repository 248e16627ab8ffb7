use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::merge::{comment_threads, merge_intents};
use crate::models::intent::{MergedSubscription, RegistrationId, SubscriptionIntent};

/// What a registry mutation means for the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChange {
    /// The merged payload differs from the previous one and a non-empty payload is pending.
    pub desired_changed: bool,
    /// Comment threads that were not tracked before this mutation.
    pub added_threads: Vec<String>,
}

impl RegistryChange {
    pub fn is_noop(&self) -> bool {
        !self.desired_changed && self.added_threads.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSnapshot {
    pub entries: BTreeMap<RegistrationId, SubscriptionIntent>,
    pub desired: Option<MergedSubscription>,
    pub pending: bool,
    pub threads: Vec<String>,
}

/// Every consumer's intent, plus the merged view derived from all of them.
///
/// Entries are kept ordered by id so recomputation never depends on the order in which
/// consumers registered.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<RegistrationId, SubscriptionIntent>,
    desired: Option<MergedSubscription>,
    pending: bool,
    threads: Vec<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: RegistrationId, intent: SubscriptionIntent) -> RegistryChange {
        debug!("Registering subscription intent {}", id);
        self.entries.insert(id, intent);
        self.recompute()
    }

    /// Removing an id that was never registered leaves everything untouched.
    pub fn unregister(&mut self, id: &RegistrationId) -> RegistryChange {
        if self.entries.remove(id).is_none() {
            return RegistryChange::default();
        }
        debug!("Unregistered subscription intent {}", id);
        self.recompute()
    }

    fn recompute(&mut self) -> RegistryChange {
        let merged = merge_intents(self.entries.values());
        let threads = comment_threads(self.entries.values());

        let previous: BTreeSet<&String> = self.threads.iter().collect();
        let added_threads: Vec<String> = threads
            .iter()
            .filter(|thread| !previous.contains(thread))
            .cloned()
            .collect();
        self.threads = threads;

        let mut desired_changed = false;
        if merged.is_empty() {
            self.desired = None;
            self.pending = false;
        } else if self.desired.as_ref() != Some(&merged) {
            self.desired = Some(merged);
            self.pending = true;
            desired_changed = true;
        }

        RegistryChange {
            desired_changed,
            added_threads,
        }
    }

    pub fn desired(&self) -> Option<&MergedSubscription> {
        self.desired.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Hands the desired payload to the transport and clears the pending flag.
    pub fn take_pending(&mut self) -> Option<MergedSubscription> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        self.desired.clone()
    }

    /// Marks the current desired payload as awaiting transmission again, e.g. after the
    /// transport was lost.
    pub fn mark_pending(&mut self) {
        self.pending = self.desired.is_some();
    }

    pub fn threads(&self) -> &[String] {
        &self.threads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.desired = None;
        self.pending = false;
        self.threads.clear();
    }

    pub fn snapshot(&self) -> SubscriptionSnapshot {
        SubscriptionSnapshot {
            entries: self.entries.clone(),
            desired: self.desired.clone(),
            pending: self.pending,
            threads: self.threads.clone(),
        }
    }
}
