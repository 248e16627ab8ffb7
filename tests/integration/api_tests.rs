use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

use tronstream::{
    RealtimeConfig, RealtimeSession,
    models::intent::SubscriptionIntent,
    server::app,
    state::AppState,
    websocket::backoff::ReconnectPolicy,
};

const ADMIN_TOKEN: &str = "test_admin_token";

fn unreachable_session() -> RealtimeSession {
    let mut config = RealtimeConfig::new("ws://127.0.0.1:1/ws", None).unwrap();
    config.reconnect = ReconnectPolicy::new(Duration::from_millis(50), Duration::from_millis(200));
    RealtimeSession::start(config)
}

fn test_app(session: &RealtimeSession) -> Router {
    app(Arc::new(AppState::new(
        session.client(),
        ADMIN_TOKEN.to_string(),
    )))
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("authorization", token);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_api_routes_unauthorized() {
    let session = unreachable_session();
    let app = test_app(&session);

    for (method, uri) in [
        ("GET", "/status"),
        ("GET", "/subscriptions"),
        ("GET", "/feeds/memos"),
        ("POST", "/reconnect"),
    ] {
        let response = call(&app, method, uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);

        let response = call(&app, method, uri, Some("wrong")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{} {}", method, uri);
    }

    let body = json_body(call(&app, "GET", "/status", None).await).await;
    assert_eq!(body, json!({ "error": "UNAUTHORIZED" }));

    session.shutdown().await;
}

#[tokio::test]
async fn test_bearer_token_is_accepted() {
    let session = unreachable_session();
    let app = test_app(&session);

    let bearer = format!("Bearer {}", ADMIN_TOKEN);
    let response = call(&app, "GET", "/status", Some(&bearer)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = call(&app, "GET", "/status", Some("Bearer wrong")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = call(&app, "GET", "/status", Some("Bearer ")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    session.shutdown().await;
}

#[tokio::test]
async fn test_status_reports_connection_state() {
    let session = unreachable_session();
    let app = test_app(&session);

    let response = call(&app, "GET", "/status", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["error"], Value::Null);
    let status = body["data"]["status"].as_str().unwrap();
    assert!(
        ["idle", "connecting", "reconnecting", "disconnected"].contains(&status),
        "unexpected status {}",
        status
    );
    assert!(body["data"]["tone"].is_string());
    assert!(body["data"]["reconnectAttempts"].is_u64());

    session.shutdown().await;
}

#[tokio::test]
async fn test_subscriptions_snapshot() {
    let session = unreachable_session();
    let client = session.client();
    let app = test_app(&session);

    client
        .register("dashboard".into(), SubscriptionIntent::all_markets())
        .unwrap();

    let mut subscriptions = client.watch_subscriptions();
    tokio::time::timeout(
        Duration::from_secs(5),
        subscriptions.wait_for(|s| !s.entries.is_empty()),
    )
    .await
    .unwrap()
    .unwrap();

    let body = json_body(call(&app, "GET", "/subscriptions", Some(ADMIN_TOKEN)).await).await;
    let data = &body["data"];
    assert_eq!(data["entries"]["dashboard"], json!({ "markets": { "all": true } }));
    assert_eq!(data["desired"], json!({ "markets": { "all": true } }));
    // Never connected, so the merged payload is still waiting to go out.
    assert_eq!(data["pending"], true);

    session.shutdown().await;
}

#[tokio::test]
async fn test_feed_routes() {
    let session = unreachable_session();
    let app = test_app(&session);

    let response = call(&app, "GET", "/feeds/memos?limit=5", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "data": [], "error": null }));

    let response = call(&app, "GET", "/feeds/trades", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"], "unknown feed 'trades'");

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnect_route() {
    let session = unreachable_session();
    let app = test_app(&session);

    let response = call(&app, "POST", "/reconnect", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::OK);

    session.shutdown().await;

    let response = call(&app, "POST", "/reconnect", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["error"], "Channel closed");
}

#[tokio::test]
async fn test_unknown_route() {
    let session = unreachable_session();
    let app = test_app(&session);

    let response = call(&app, "GET", "/nope", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await, json!({ "error": "NOT_FOUND" }));

    session.shutdown().await;
}
