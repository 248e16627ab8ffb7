pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod plugin;
pub mod router;
pub mod server;
pub mod state;
pub mod subscription;
pub mod utils;
pub mod websocket;

pub use api::types::{ApiResponse, ApiResult, IntoApiResponse, api_response};
pub use config::{AppConfig, RealtimeConfig};
pub use error::{RealtimeError, Result};
pub use plugin::PluginApi;
pub use server::StatusServer;
pub use websocket::{RealtimeClient, RealtimeSession};
