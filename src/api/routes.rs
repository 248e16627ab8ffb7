use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use super::{handlers, middleware::admin_auth};
use crate::state::AppState;

pub fn configure_api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::status_handler))
        .route("/subscriptions", get(handlers::subscriptions_handler))
        .route("/feeds/{kind}", get(handlers::feed_handler))
        .route("/reconnect", post(handlers::reconnect_handler))
        .route_layer(middleware::from_fn_with_state(state, admin_auth))
}
