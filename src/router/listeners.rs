use serde_json::Value;
use std::{collections::HashMap, fmt, sync::Arc};

pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    once: bool,
    callback: Listener,
}

/// Callbacks keyed by wire event name.
#[derive(Default)]
pub struct ListenerTable {
    next_id: u64,
    listeners: HashMap<String, Vec<Entry>>,
}

impl fmt::Debug for ListenerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerTable")
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, event: impl Into<String>, callback: Listener, once: bool) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Entry { id, once, callback });
        id
    }

    pub fn on(&mut self, event: impl Into<String>, callback: Listener) -> ListenerId {
        self.insert(event, callback, false)
    }

    pub fn once(&mut self, event: impl Into<String>, callback: Listener) -> ListenerId {
        self.insert(event, callback, true)
    }

    pub fn off(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(event);
        }
        removed
    }

    /// Invokes every listener for `event` in registration order. Returns how many ran.
    pub fn emit(&mut self, event: &str, data: &Value) -> usize {
        let Some(entries) = self.listeners.get_mut(event) else {
            return 0;
        };
        for entry in entries.iter() {
            (entry.callback)(data);
        }
        let invoked = entries.len();
        entries.retain(|entry| !entry.once);
        if entries.is_empty() {
            self.listeners.remove(event);
        }
        invoked
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}
