pub mod backoff;
pub mod client;
pub mod connection;
pub mod controller;
pub mod heartbeat;

pub use client::{RealtimeClient, RealtimeSession};
