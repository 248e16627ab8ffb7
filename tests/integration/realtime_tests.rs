#[path = "../common/helpers.rs"]
mod helpers;

use chrono::Utc;
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use helpers::{MOCK_SOCKET_ID, MockServer, eventually, test_config, wait_for_state};
use tronstream::{
    RealtimeError, RealtimeSession,
    models::{
        connection::{ConnectionStatus, LifecycleSignal},
        intent::{RegistrationId, SubscriptionIntent},
    },
    websocket::backoff::ReconnectPolicy,
};

const UNREACHABLE: &str = "ws://127.0.0.1:1/ws";

#[tokio::test]
async fn test_flush_on_connect_and_thread_subscribe() {
    let mut server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    client
        .register("markets-panel".into(), SubscriptionIntent::all_markets())
        .unwrap();
    client
        .register("comments".into(), SubscriptionIntent::comment_thread("memo-42"))
        .unwrap();

    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "markets": { "all": true } })
    );
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "comments": { "resourceId": "memo-42" } })
    );

    let mut state_rx = client.watch_state();
    let state = wait_for_state(&mut state_rx, |s| s.is_connected()).await;
    assert_eq!(state.socket_id.as_deref(), Some(MOCK_SOCKET_ID));
    assert_eq!(state.reconnect_attempts, 0);

    // An equivalent registration under another id changes nothing on the wire.
    client
        .register("ticker".into(), SubscriptionIntent::all_markets())
        .unwrap();
    server
        .assert_no_event("subscribe", Duration::from_millis(300))
        .await;

    eventually(|| {
        let client = client.clone();
        async move { client.subscriptions().entries.len() == 3 }
    })
    .await;
    let snapshot = client.subscriptions();
    assert!(!snapshot.pending);
    assert_eq!(snapshot.threads, ["memo-42"]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_changes_while_connected_are_sent_immediately() {
    let mut server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    let a = RegistrationId::new("a");
    let b = RegistrationId::new("b");
    client
        .register(a.clone(), SubscriptionIntent::transactions(Some(500.0), vec!["TAddr1".into()]))
        .unwrap();
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "transactions": { "minAmount": 500.0, "addresses": ["TAddr1"] } })
    );

    client
        .register(b.clone(), SubscriptionIntent::transactions(Some(100.0), vec!["TAddr2".into()]))
        .unwrap();
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "transactions": { "minAmount": 100.0, "addresses": ["TAddr1", "TAddr2"] } })
    );

    client.unregister(&b).unwrap();
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "transactions": { "minAmount": 500.0, "addresses": ["TAddr1"] } })
    );

    // Last entry gone: nothing left to send.
    client.unregister(&a).unwrap();
    client.unregister(&a).unwrap();
    server
        .assert_no_event("subscribe", Duration::from_millis(300))
        .await;
    eventually(|| {
        let client = client.clone();
        async move { client.subscriptions().entries.is_empty() }
    })
    .await;
    assert_eq!(client.subscriptions().desired, None);

    session.shutdown().await;
}

#[tokio::test]
async fn test_inbound_events_reach_feeds_and_listeners() {
    let server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    client
        .on(
            "memo:new",
            Arc::new(move |_: &Value| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    let memo = json!({
        "id": "m1",
        "txId": "abc123",
        "from": "TFrom",
        "to": "TTo",
        "amount": 12.5,
        "memo": "gm tron",
        "timestamp": Utc::now(),
    });
    server.send_event("memo:new", memo.clone()).await;
    server.send_event("memo:new", memo).await;
    server.send_event("memo:new", json!({ "id": "broken" })).await;

    let feeds = client.feeds();
    eventually(|| {
        let seen = seen.clone();
        async move { seen.load(Ordering::SeqCst) == 3 }
    })
    .await;

    let store = feeds.read().await;
    assert_eq!(store.memos.len(), 1);
    assert_eq!(store.memos.latest().unwrap().memo, "gm tron");
    drop(store);

    server.send_event("session", json!({ "socketId": "FROM-SESSION" })).await;
    let state = wait_for_state(&mut state_rx, |s| {
        s.socket_id.as_deref() == Some("FROM-SESSION")
    })
    .await;
    assert!(state.is_connected());

    session.shutdown().await;
}

#[tokio::test]
async fn test_heartbeat_ack_records_latency() {
    let mut server = MockServer::start_with(Some(42.0)).await;
    let mut config = test_config(&server.url);
    config.heartbeat_interval = Duration::from_millis(100);
    let session = RealtimeSession::start(config);
    let client = session.client();

    let ping = server.next_event("heartbeat").await;
    assert!(ping["sentAt"].as_i64().unwrap() > 0);

    let mut state_rx = client.watch_state();
    let state = wait_for_state(&mut state_rx, |s| s.last_latency_ms.is_some()).await;
    assert_eq!(state.last_latency_ms, Some(42.0));
    assert_eq!(state.average_latency_ms, Some(42.0));
    assert!(state.last_heartbeat_at.is_some());

    session.shutdown().await;
}

#[tokio::test]
async fn test_drop_reconnects_and_replays() {
    let mut server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    client
        .register("memos".into(), SubscriptionIntent::all_memos())
        .unwrap();
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "memos": { "all": true } })
    );

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    server.close_all().await;

    // The replay only happens on the second connection.
    assert_eq!(
        server.next_event("subscribe").await,
        json!({ "memos": { "all": true } })
    );
    assert_eq!(server.connections(), 2);

    let state = wait_for_state(&mut state_rx, |s| s.is_connected()).await;
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(state.error, None);
    assert!(state.last_disconnected_at.is_some());

    session.shutdown().await;
}

#[tokio::test]
async fn test_server_disconnect_event_is_a_drop() {
    let server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    server.send_event("disconnect", json!({ "reason": "maintenance" })).await;
    eventually(|| {
        let connections = server.connections();
        async move { connections == 2 }
    })
    .await;
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_offline_waits_for_online_and_flushes_outbox() {
    let mut server = MockServer::start().await;
    let session = RealtimeSession::start(test_config(&server.url));
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    client.signal(LifecycleSignal::Offline).unwrap();
    let state = wait_for_state(&mut state_rx, |s| !s.is_connected()).await;
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.error.as_deref(), Some("offline"));

    let plugin = client.plugin("energy-bot");
    plugin.emit("ping", &json!({ "n": 1 })).unwrap();
    plugin.subscribe(&json!({ "pairs": ["TRX/ENERGY"] })).unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);
    assert!(!client.connection_state().is_connected());

    client.signal(LifecycleSignal::Online).unwrap();
    assert_eq!(server.next_event("plugin:energy-bot:ping").await, json!({ "n": 1 }));
    assert_eq!(
        server.next_event("plugin:energy-bot:subscribe").await,
        json!({ "pairs": ["TRX/ENERGY"] })
    );
    assert_eq!(server.connections(), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_offline_cancels_pending_reconnect() {
    let mut config = test_config(UNREACHABLE);
    config.reconnect = ReconnectPolicy::new(Duration::from_millis(300), Duration::from_millis(300));
    let session = RealtimeSession::start(config);
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| {
        s.status == ConnectionStatus::Reconnecting && s.reconnect_attempts >= 1
    })
    .await;

    client.signal(LifecycleSignal::Offline).unwrap();
    let state = wait_for_state(&mut state_rx, |s| s.error.as_deref() == Some("offline")).await;
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    let attempts = state.reconnect_attempts;

    // Well past the 300ms timer that was pending when we went offline.
    tokio::time::sleep(Duration::from_millis(800)).await;
    let state = client.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.reconnect_attempts, attempts);
    assert_eq!(state.error.as_deref(), Some("offline"));

    session.shutdown().await;
}

#[tokio::test]
async fn test_visible_reconnects_immediately() {
    let server = MockServer::start().await;
    let mut config = test_config(&server.url);
    // Long enough that only the signal can explain a quick second connection.
    config.reconnect = ReconnectPolicy::new(Duration::from_secs(30), Duration::from_secs(30));
    let session = RealtimeSession::start(config);
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    client.signal(LifecycleSignal::Offline).unwrap();
    wait_for_state(&mut state_rx, |s| !s.is_connected()).await;
    assert_eq!(server.connections(), 1);

    client.signal(LifecycleSignal::Visible).unwrap();
    let state = wait_for_state(&mut state_rx, |s| s.is_connected()).await;
    assert_eq!(state.reconnect_attempts, 0);
    assert_eq!(state.error, None);
    eventually(|| {
        let connections = server.connections();
        async move { connections == 2 }
    })
    .await;

    // Already connected: a second signal opens nothing new.
    client.signal(LifecycleSignal::Visible).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections(), 2);

    session.shutdown().await;
}

#[tokio::test]
async fn test_zero_timers_do_not_stop_the_driver() {
    let server = MockServer::start().await;
    let mut config = test_config(&server.url);
    config.heartbeat_interval = Duration::ZERO;
    config.prune_interval = Duration::ZERO;
    config.reconnect = ReconnectPolicy::new(Duration::ZERO, Duration::ZERO);
    let session = RealtimeSession::start(config);
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.is_connected()).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    // Errors only once the driver, which owns the sender, has gone away.
    assert!(state_rx.has_changed().is_ok());
    assert!(client.connection_state().is_connected());
    client
        .register("after".into(), SubscriptionIntent::all_memos())
        .unwrap();

    session.shutdown().await;
}

#[tokio::test]
async fn test_dropping_session_stops_background_tasks() {
    let session = RealtimeSession::start(test_config(UNREACHABLE));
    let feeds = session.client().feeds();
    let state_rx = session.client().watch_state();

    // Driver, prune tick and the session's client each hold the feed store.
    assert!(Arc::strong_count(&feeds) > 1);
    drop(session);

    eventually(|| {
        let count = Arc::strong_count(&feeds);
        async move { count == 1 }
    })
    .await;
    assert!(state_rx.has_changed().is_err());
}

#[tokio::test]
async fn test_teardown_while_reconnecting() {
    let session = RealtimeSession::start(test_config(UNREACHABLE));
    let client = session.client();

    let mut state_rx = client.watch_state();
    wait_for_state(&mut state_rx, |s| s.reconnect_attempts >= 2).await;

    session.shutdown().await;

    let state = client.connection_state();
    assert_eq!(state.status, ConnectionStatus::Disconnected);
    assert_eq!(state.error.as_deref(), Some("component-unmounted"));
    let attempts = state.reconnect_attempts;

    tokio::time::sleep(Duration::from_millis(500)).await;
    let state = client.connection_state();
    assert_eq!(state.reconnect_attempts, attempts);
    assert_eq!(state.status, ConnectionStatus::Disconnected);

    assert!(matches!(
        client.register("late".into(), SubscriptionIntent::all_markets()),
        Err(RealtimeError::ChannelClosed)
    ));
    assert!(matches!(
        client.signal(LifecycleSignal::Online),
        Err(RealtimeError::ChannelClosed)
    ));
}
