use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    sync::{RwLock, mpsc, watch},
    task::JoinHandle,
    time::interval,
};
use tracing::{debug, warn};

use super::connection::ConnectionDriver;
use crate::{
    config::RealtimeConfig,
    error::{RealtimeError, Result},
    models::{
        connection::{ConnectionState, LifecycleSignal},
        intent::{RegistrationId, SubscriptionIntent},
    },
    plugin::PluginApi,
    router::{EventRouter, FeedStore, Feeds, Listener, ListenerId, ListenerTable},
    subscription::SubscriptionSnapshot,
};

/// Everything the driver can be asked to do, applied in arrival order.
#[derive(Debug)]
pub(crate) enum ControlCommand {
    Register {
        id: RegistrationId,
        intent: SubscriptionIntent,
    },
    Unregister {
        id: RegistrationId,
    },
    Emit {
        event: String,
        data: Value,
    },
    Signal(LifecycleSignal),
    Shutdown,
}

/// Cheap, cloneable handle to a running session.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<ControlCommand>,
    state: watch::Receiver<ConnectionState>,
    subscriptions: watch::Receiver<SubscriptionSnapshot>,
    router: EventRouter,
}

impl RealtimeClient {
    fn send(&self, command: ControlCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    /// Upserts the intent for `id`. Registering an equivalent intent again sends nothing.
    pub fn register(&self, id: RegistrationId, intent: SubscriptionIntent) -> Result<()> {
        self.send(ControlCommand::Register { id, intent })
    }

    /// Registers under a freshly generated id and returns it.
    pub fn subscribe(&self, intent: SubscriptionIntent) -> Result<RegistrationId> {
        let id = RegistrationId::generate();
        self.register(id.clone(), intent)?;
        Ok(id)
    }

    pub fn unregister(&self, id: &RegistrationId) -> Result<()> {
        self.send(ControlCommand::Unregister { id: id.clone() })
    }

    /// Sends a raw event. Buffered while disconnected.
    pub fn emit<T: Serialize>(&self, event: impl Into<String>, data: &T) -> Result<()> {
        let data = serde_json::to_value(data)?;
        self.send(ControlCommand::Emit {
            event: event.into(),
            data,
        })
    }

    pub fn signal(&self, signal: LifecycleSignal) -> Result<()> {
        self.send(ControlCommand::Signal(signal))
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscriptions(&self) -> SubscriptionSnapshot {
        self.subscriptions.borrow().clone()
    }

    pub fn watch_subscriptions(&self) -> watch::Receiver<SubscriptionSnapshot> {
        self.subscriptions.clone()
    }

    pub fn feeds(&self) -> Feeds {
        self.router.feeds().clone()
    }

    pub async fn on(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.router.listeners().write().await.on(event, listener)
    }

    pub async fn once(&self, event: impl Into<String>, listener: Listener) -> ListenerId {
        self.router.listeners().write().await.once(event, listener)
    }

    pub async fn off(&self, event: &str, id: ListenerId) -> bool {
        self.router.listeners().write().await.off(event, id)
    }

    pub fn plugin(&self, plugin_id: impl Into<String>) -> PluginApi {
        PluginApi::new(plugin_id, self.clone())
    }
}

/// A running connection: the driver task plus the feed prune tick.
pub struct RealtimeSession {
    client: RealtimeClient,
    driver: JoinHandle<()>,
    prune: JoinHandle<()>,
}

impl RealtimeSession {
    /// Spawns the driver and starts connecting immediately. Must be called inside a tokio
    /// runtime.
    pub fn start(config: RealtimeConfig) -> Self {
        let config = config.sanitized();
        let alert_window = chrono::Duration::from_std(config.alert_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(crate::router::DEFAULT_ALERT_WINDOW_SECS));
        let feeds = Arc::new(RwLock::new(FeedStore::new(config.feed_capacity, alert_window)));
        let listeners = Arc::new(RwLock::new(ListenerTable::new()));
        let router = EventRouter::new(feeds, listeners);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::default());
        let (subscriptions_tx, subscriptions_rx) = watch::channel(SubscriptionSnapshot::default());

        let prune_interval = config.prune_interval;
        let driver = ConnectionDriver::new(
            config,
            commands_rx,
            state_tx,
            subscriptions_tx,
            router.clone(),
        );
        let driver = tokio::spawn(driver.run());

        let prune_router = router.clone();
        let mut driver_state = state_rx.clone();
        let prune = tokio::spawn(async move {
            let mut tick = interval(prune_interval);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let evicted = prune_router.prune(Utc::now()).await;
                        if evicted > 0 {
                            debug!("Pruned {} expired alerts", evicted);
                        }
                    }
                    // The sender lives in the driver, so this errors once the driver exits.
                    changed = driver_state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let client = RealtimeClient {
            commands: commands_tx,
            state: state_rx,
            subscriptions: subscriptions_rx,
            router,
        };

        Self {
            client,
            driver,
            prune,
        }
    }

    pub fn client(&self) -> RealtimeClient {
        self.client.clone()
    }

    /// Tears the connection down and waits for the driver to exit. No reconnect happens
    /// afterwards, even if a timer was pending.
    pub async fn shutdown(mut self) {
        self.prune.abort();
        if self.client.send(ControlCommand::Shutdown).is_err() {
            debug!("Realtime driver already stopped");
        }
        if let Err(e) = (&mut self.driver).await {
            warn!("Realtime driver task failed: {}", e);
        }
    }
}

/// Dropping the session without `shutdown` still stops the prune tick. The driver follows
/// once the last `RealtimeClient` clone is gone.
impl Drop for RealtimeSession {
    fn drop(&mut self) {
        self.prune.abort();
    }
}
