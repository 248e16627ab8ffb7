use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::types::{ApiResult, FeedQuery, StatusView, api_response};
use crate::{
    models::connection::LifecycleSignal, router::FeedKind, state::AppState,
    subscription::SubscriptionSnapshot,
};

const DEFAULT_FEED_LIMIT: usize = 50;

pub async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusView> {
    ApiResult::ok(StatusView::from(state.client.connection_state()))
}

pub async fn subscriptions_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<SubscriptionSnapshot> {
    ApiResult::ok(state.client.subscriptions())
}

pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Value> {
    let kind = match kind.parse::<FeedKind>() {
        Ok(kind) => kind,
        Err(e) => return ApiResult::error(StatusCode::NOT_FOUND, e),
    };
    let limit = query.limit.unwrap_or(DEFAULT_FEED_LIMIT);

    let feeds = state.client.feeds();
    let feeds = feeds.read().await;
    api_response(feeds.recent(kind, limit))
}

/// Manual nudge: behaves like connectivity coming back.
pub async fn reconnect_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusView> {
    info!("Reconnect requested through status API");
    match state.client.signal(LifecycleSignal::Online) {
        Ok(()) => ApiResult::ok(StatusView::from(state.client.connection_state())),
        Err(e) => ApiResult::error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}
