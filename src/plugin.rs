//! Namespaced access to the shared connection for plugins.
//!
//! A plugin never owns a socket. Everything it sends or listens for is prefixed with
//! `plugin:<id>:` and travels over the one connection the session already holds.

use serde::Serialize;

use crate::error::Result;
use crate::models::events::{SUBSCRIBE, UNSUBSCRIBE};
use crate::router::{Listener, ListenerId};
use crate::websocket::RealtimeClient;

pub const PLUGIN_PREFIX: &str = "plugin";

pub fn namespaced(plugin_id: &str, name: &str) -> String {
    format!("{}:{}:{}", PLUGIN_PREFIX, plugin_id, name)
}

#[derive(Clone)]
pub struct PluginApi {
    plugin_id: String,
    client: RealtimeClient,
}

impl PluginApi {
    pub(crate) fn new(plugin_id: impl Into<String>, client: RealtimeClient) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            client,
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn event_name(&self, name: &str) -> String {
        namespaced(&self.plugin_id, name)
    }

    pub async fn on(&self, name: &str, listener: Listener) -> ListenerId {
        self.client.on(self.event_name(name), listener).await
    }

    pub async fn once(&self, name: &str, listener: Listener) -> ListenerId {
        self.client.once(self.event_name(name), listener).await
    }

    pub async fn off(&self, name: &str, id: ListenerId) -> bool {
        self.client.off(&self.event_name(name), id).await
    }

    pub fn emit<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        self.client.emit(self.event_name(name), data)
    }

    pub fn subscribe<T: Serialize>(&self, payload: &T) -> Result<()> {
        self.emit(SUBSCRIBE, payload)
    }

    pub fn unsubscribe<T: Serialize>(&self, payload: &T) -> Result<()> {
        self.emit(UNSUBSCRIBE, payload)
    }
}
