//! The driver task: sole owner of the transport, the controller and the registry.

use chrono::Utc;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use std::{collections::VecDeque, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    time::{interval, sleep},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::protocol::{CloseFrame, Message, frame::coding::CloseCode},
};
use tracing::{debug, info, warn};

use super::client::ControlCommand;
use super::controller::{ConnectionController, SERVER_DISCONNECT};
use crate::{
    config::{OUTBOX_CAPACITY, RealtimeConfig},
    error::Result,
    models::{
        connection::{ConnectionState, ConnectionStatus, LifecycleSignal},
        events::{Envelope, HEARTBEAT, HEARTBEAT_ACK, HeartbeatPing, SUBSCRIBE, ServerEvent},
        intent::ThreadSubscription,
    },
    router::EventRouter,
    subscription::{SubscriptionRegistry, SubscriptionSnapshot},
    utils::id_generator::{SOCKET_ID_LEN, mini_id},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const SOCKET_ID_HEADER: &str = "x-socket-id";

enum Phase {
    Connect,
    /// Waiting for a timer, or for a signal when there is none.
    Wait(Option<Duration>),
    Stop,
}

enum Flow {
    Continue,
    Connect,
    Offline,
    Stop,
}

pub(crate) struct ConnectionDriver {
    config: RealtimeConfig,
    controller: ConnectionController,
    registry: SubscriptionRegistry,
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    state_tx: watch::Sender<ConnectionState>,
    subscriptions_tx: watch::Sender<SubscriptionSnapshot>,
    router: EventRouter,
    outbox: VecDeque<String>,
}

impl ConnectionDriver {
    pub(crate) fn new(
        config: RealtimeConfig,
        commands: mpsc::UnboundedReceiver<ControlCommand>,
        state_tx: watch::Sender<ConnectionState>,
        subscriptions_tx: watch::Sender<SubscriptionSnapshot>,
        router: EventRouter,
    ) -> Self {
        Self {
            controller: ConnectionController::new(config.reconnect),
            config,
            registry: SubscriptionRegistry::new(),
            commands,
            state_tx,
            subscriptions_tx,
            router,
            outbox: VecDeque::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        info!(
            "Realtime driver started for {}",
            self.config.url.host_str().unwrap_or("<no host>")
        );

        let mut phase = Phase::Connect;
        loop {
            phase = match phase {
                Phase::Connect => self.connect().await,
                Phase::Wait(delay) => self.wait(delay).await,
                Phase::Stop => break,
            };
        }

        info!("Realtime driver stopped");
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.controller.state().clone());
    }

    fn publish_subscriptions(&self) {
        self.subscriptions_tx.send_replace(self.registry.snapshot());
    }

    async fn connect(&mut self) -> Phase {
        if !self.controller.begin_connect() {
            return self.idle_phase();
        }
        self.publish_state();
        debug!("Opening WebSocket to {}", self.config.url.path());

        let url = self.config.url.to_string();
        let handshake = connect_async(url);
        tokio::pin!(handshake);

        let result = loop {
            tokio::select! {
                result = &mut handshake => break result,
                command = self.commands.recv() => {
                    match self.handle_command(command, None).await {
                        Flow::Continue | Flow::Connect => {}
                        Flow::Offline => return Phase::Wait(None),
                        Flow::Stop => return Phase::Stop,
                    }
                }
            }
        };

        match result {
            Ok((stream, response)) => {
                let socket_id = response
                    .headers()
                    .get(SOCKET_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .filter(|value| !value.is_empty())
                    .map(String::from)
                    .unwrap_or_else(|| mini_id(SOCKET_ID_LEN).to_string());

                if !self.controller.connected(socket_id, Utc::now()) {
                    return self.idle_phase();
                }
                self.publish_state();
                info!(
                    "Realtime connection established (socket {})",
                    self.controller.state().socket_id.as_deref().unwrap_or("?")
                );
                self.session(stream).await
            }
            Err(e) => {
                warn!("Realtime connection attempt failed: {}", e);
                let reconnect = self.controller.connect_failed(e.to_string());
                self.after_drop(reconnect)
            }
        }
    }

    fn idle_phase(&self) -> Phase {
        if self.controller.is_manually_disconnected() {
            Phase::Stop
        } else {
            Phase::Wait(None)
        }
    }

    fn after_drop(&mut self, reconnect: bool) -> Phase {
        let phase = if self.controller.is_manually_disconnected() {
            Phase::Stop
        } else if reconnect {
            match self.controller.schedule_reconnect(Utc::now()) {
                Some(delay) => Phase::Wait(Some(delay)),
                None => Phase::Wait(None),
            }
        } else {
            Phase::Wait(None)
        };
        self.publish_state();
        phase
    }

    fn dropped(&mut self, reason: String) -> Phase {
        warn!("Realtime connection lost: {}", reason);
        let reconnect = self.controller.disconnected(reason, Utc::now());
        self.registry.mark_pending();
        self.publish_subscriptions();
        self.after_drop(reconnect)
    }

    async fn wait(&mut self, delay: Option<Duration>) -> Phase {
        if let Some(delay) = delay {
            info!(
                "Reconnecting in {:?} (attempt {})",
                delay,
                self.controller.state().reconnect_attempts
            );
        }

        let timer = async move {
            match delay {
                Some(delay) => sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => return Phase::Connect,
                command = self.commands.recv() => {
                    match self.handle_command(command, None).await {
                        Flow::Continue => {}
                        Flow::Connect => return Phase::Connect,
                        Flow::Offline => return Phase::Wait(None),
                        Flow::Stop => return Phase::Stop,
                    }
                }
            }
        }
    }

    async fn session(&mut self, stream: WsStream) -> Phase {
        let (mut sink, mut source): (WsSink, WsSource) = stream.split();

        if let Err(e) = self.flush(&mut sink).await {
            return self.dropped(e.to_string());
        }

        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.reset();

        loop {
            tokio::select! {
                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reason) = self.handle_text(&text).await {
                                return self.dropped(reason);
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Received ping, sending pong");
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                return self.dropped(e.to_string());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|frame| frame.reason.as_str().to_string())
                                .filter(|reason| !reason.is_empty())
                                .unwrap_or_else(|| SERVER_DISCONNECT.to_string());
                            return self.dropped(reason);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return self.dropped(e.to_string()),
                        None => return self.dropped(SERVER_DISCONNECT.to_string()),
                    }
                }

                command = self.commands.recv() => {
                    match self.handle_command(command, Some(&mut sink)).await {
                        Flow::Continue | Flow::Connect => {}
                        Flow::Offline => {
                            let _ = sink.close().await;
                            return Phase::Wait(None);
                        }
                        Flow::Stop => {
                            let close_frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client shutdown".into(),
                            };
                            let _ = sink.send(Message::Close(Some(close_frame))).await;
                            return Phase::Stop;
                        }
                    }
                    // A failed send inside the command handler already marked the connection down.
                    if self.controller.status() != ConnectionStatus::Connected {
                        self.publish_subscriptions();
                        return self.after_drop(true);
                    }
                }

                _ = heartbeat.tick() => {
                    let ping = HeartbeatPing { sent_at: Utc::now().timestamp_millis() };
                    if let Err(e) = send(&mut sink, HEARTBEAT, &ping).await {
                        return self.dropped(e.to_string());
                    }
                }
            }
        }
    }

    /// Replays the desired subscription and every comment thread, then drains the outbox.
    async fn flush(&mut self, sink: &mut WsSink) -> Result<()> {
        if let Some(desired) = self.registry.take_pending() {
            send(sink, SUBSCRIBE, &desired).await?;
        }
        for thread in self.registry.threads().to_vec() {
            send(sink, SUBSCRIBE, &ThreadSubscription::new(thread)).await?;
        }
        self.publish_subscriptions();

        if !self.outbox.is_empty() {
            debug!("Flushing {} buffered messages", self.outbox.len());
        }
        while let Some(frame) = self.outbox.pop_front() {
            sink.send(Message::Text(frame.into())).await?;
        }
        Ok(())
    }

    /// Returns a disconnect reason when the server asked us to go away.
    async fn handle_text(&mut self, text: &str) -> Option<String> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Ignoring malformed frame: {}", e);
                return None;
            }
        };

        let now = Utc::now();
        match self.router.route(&envelope, now).await {
            Some(ServerEvent::HeartbeatAck(ack)) => {
                self.controller.heartbeat(ack.sample(now), now);
                self.publish_state();
            }
            None if envelope.event == HEARTBEAT_ACK => {
                self.controller.heartbeat(None, now);
                self.publish_state();
            }
            Some(ServerEvent::Session(session)) => {
                self.controller.set_socket_id(session.socket_id);
                self.publish_state();
            }
            Some(ServerEvent::Disconnect(notice)) => {
                return Some(
                    notice
                        .reason
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| SERVER_DISCONNECT.to_string()),
                );
            }
            _ => {}
        }
        None
    }

    async fn handle_command(
        &mut self,
        command: Option<ControlCommand>,
        sink: Option<&mut WsSink>,
    ) -> Flow {
        let Some(command) = command else {
            debug!("All realtime handles dropped");
            self.teardown().await;
            return Flow::Stop;
        };

        match command {
            ControlCommand::Register { id, intent } => {
                let change = self.registry.register(id, intent);
                self.sync_subscriptions(change.desired_changed, change.added_threads, sink)
                    .await;
                Flow::Continue
            }
            ControlCommand::Unregister { id } => {
                let change = self.registry.unregister(&id);
                self.sync_subscriptions(change.desired_changed, change.added_threads, sink)
                    .await;
                Flow::Continue
            }
            ControlCommand::Emit { event, data } => {
                let frame = match Envelope::encode(&event, &data) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Dropping outbound '{}': {}", event, e);
                        return Flow::Continue;
                    }
                };
                match sink {
                    Some(sink) => {
                        debug!("Sending '{}'", event);
                        if let Err(e) = sink.send(Message::Text(frame.clone().into())).await {
                            self.send_failed(e.to_string());
                            // Delivered after the next connect.
                            self.buffer(frame);
                        }
                    }
                    None => self.buffer(frame),
                }
                Flow::Continue
            }
            ControlCommand::Signal(signal) => self.handle_signal(signal, sink.is_some()),
            ControlCommand::Shutdown => {
                self.teardown().await;
                Flow::Stop
            }
        }
    }

    async fn sync_subscriptions(
        &mut self,
        desired_changed: bool,
        added_threads: Vec<String>,
        sink: Option<&mut WsSink>,
    ) {
        if let Some(sink) = sink {
            if desired_changed {
                if let Some(desired) = self.registry.take_pending() {
                    if let Err(e) = send(sink, SUBSCRIBE, &desired).await {
                        self.registry.mark_pending();
                        self.send_failed(e.to_string());
                    }
                }
            }
            for thread in added_threads {
                if self.controller.status() != ConnectionStatus::Connected {
                    break;
                }
                if let Err(e) = send(sink, SUBSCRIBE, &ThreadSubscription::new(thread)).await {
                    self.send_failed(e.to_string());
                }
            }
        }
        self.publish_subscriptions();
    }

    fn send_failed(&mut self, reason: String) {
        warn!("Realtime send failed: {}", reason);
        self.controller.disconnected(reason, Utc::now());
        self.registry.mark_pending();
    }

    fn buffer(&mut self, frame: String) {
        if self.outbox.len() == OUTBOX_CAPACITY {
            self.outbox.pop_front();
            debug!("Outbox full, dropped oldest buffered message");
        }
        self.outbox.push_back(frame);
    }

    fn handle_signal(&mut self, signal: LifecycleSignal, connected: bool) -> Flow {
        match signal {
            LifecycleSignal::Visible | LifecycleSignal::Online => {
                if connected || self.controller.status() == ConnectionStatus::Connecting {
                    return Flow::Continue;
                }
                match self.controller.reconnect_now(Utc::now()) {
                    Some(_) => {
                        info!("{:?} signal, reconnecting now", signal);
                        self.publish_state();
                        Flow::Connect
                    }
                    None => Flow::Continue,
                }
            }
            LifecycleSignal::Offline => {
                if self.controller.is_manually_disconnected() {
                    return Flow::Continue;
                }
                info!("Network offline, suspending reconnects");
                self.controller.went_offline(Utc::now());
                self.registry.mark_pending();
                self.publish_state();
                self.publish_subscriptions();
                Flow::Offline
            }
        }
    }

    async fn teardown(&mut self) {
        info!("Tearing down realtime connection");
        self.controller.teardown(Utc::now());
        self.registry.clear();
        self.outbox.clear();
        self.router.listeners().write().await.clear();
        self.publish_state();
        self.publish_subscriptions();
    }
}

async fn send<T: Serialize>(sink: &mut WsSink, event: &str, data: &T) -> Result<()> {
    let frame = Envelope::encode(event, data)?;
    debug!("Sending '{}'", event);
    sink.send(Message::Text(frame.into())).await?;
    Ok(())
}
