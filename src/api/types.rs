use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::models::connection::{ConnectionState, ConnectionTone};

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Success { data: T, error: Option<()> },
    Error { data: Option<()>, error: String },
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::Success { data, error: None }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            data: None,
            error: error.into(),
        }
    }
}

pub trait IntoApiResponse<T> {
    fn into_api_response(self) -> ApiResponse<T>;
}

impl<T, E: ToString> IntoApiResponse<T> for Result<T, E> {
    fn into_api_response(self) -> ApiResponse<T> {
        match self {
            Ok(data) => ApiResponse::success(data),
            Err(error) => ApiResponse::error(error.to_string()),
        }
    }
}

/// Enveloped JSON body plus the status it is sent with.
pub struct ApiResult<T> {
    pub status: StatusCode,
    pub body: ApiResponse<T>,
}

impl<T> ApiResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            body: ApiResponse::success(data),
        }
    }

    pub fn error(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ApiResponse::error(error),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResult<T> {
    fn into_response(self) -> Response {
        (self.status, axum::Json(self.body)).into_response()
    }
}

/// Errors map to 500 unless the caller picks a status.
pub fn api_response<T>(response: impl IntoApiResponse<T>) -> ApiResult<T> {
    let body = response.into_api_response();
    let status = match &body {
        ApiResponse::Success { .. } => StatusCode::OK,
        ApiResponse::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiResult { status, body }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    #[serde(flatten)]
    pub state: ConnectionState,
    pub tone: ConnectionTone,
}

impl From<ConnectionState> for StatusView {
    fn from(state: ConnectionState) -> Self {
        let tone = state.tone();
        Self { state, tone }
    }
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub limit: Option<usize>,
}
