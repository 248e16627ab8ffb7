use axum::{Json, Router, http::StatusCode};
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

use crate::api::routes;
use crate::config::StatusServerConfig;
use crate::state::AppState;
use crate::websocket::RealtimeClient;

/// Read-only HTTP view of a running session, plus a manual reconnect nudge.
pub struct StatusServer {
    state: Arc<AppState>,
    port: u16,
}

impl StatusServer {
    pub fn new(client: RealtimeClient, config: StatusServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(client, config.admin_token)),
            port: config.port,
        }
    }

    pub fn router(&self) -> Router {
        app(self.state.clone())
    }

    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Status API listening on {}", addr);

        axum::serve(listener, app(self.state)).await?;

        Ok(())
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::configure_api_routes(state.clone()))
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "NOT_FOUND" })),
            )
        })
        .with_state(state)
}
