use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;

use crate::state::AppState;

const BEARER: &str = "Bearer ";

/// Token carried by `authorization`, either bare or as `Bearer <token>`.
fn presented_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = match value.get(..BEARER.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(BEARER) => &value[BEARER.len()..],
        _ => value,
    }
    .trim();
    (!token.is_empty()).then_some(token)
}

/// Guards the status API with the configured admin token.
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<Value>)> {
    match presented_token(req.headers()) {
        Some(token) if token == state.admin_token => Ok(next.run(req).await),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "UNAUTHORIZED" })),
        )),
    }
}
