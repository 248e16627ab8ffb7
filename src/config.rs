//! Environment-driven configuration.

use std::{env, str::FromStr, time::Duration};
use url::Url;

use crate::error::{RealtimeError, Result};
use crate::models::intent::SubscriptionIntent;
use crate::router::{DEFAULT_ALERT_WINDOW_SECS, DEFAULT_FEED_CAPACITY};
use crate::websocket::backoff::{DEFAULT_RECONNECT_BASE, DEFAULT_RECONNECT_MAX, ReconnectPolicy};

pub const DEFAULT_PORT: u16 = 3113;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(5);
pub const OUTBOX_CAPACITY: usize = 100;
/// Floor for every timer the session runs.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub url: Url,
    pub reconnect: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub feed_capacity: usize,
    pub alert_window: Duration,
    pub prune_interval: Duration,
}

impl RealtimeConfig {
    /// Builds a config with default tuning. `token`, if given, is sent as the `token` query
    /// parameter on the WebSocket handshake.
    pub fn new(url: &str, token: Option<&str>) -> Result<Self> {
        let mut url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(RealtimeError::InvalidConfig {
                    key: "TRONSTREAM_WS_URL",
                    value: format!("unsupported scheme '{}'", other),
                });
            }
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair("token", token);
        }

        Ok(Self {
            url,
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            alert_window: Duration::from_secs(DEFAULT_ALERT_WINDOW_SECS as u64),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
        })
    }

    /// Raises zero timers to `MIN_INTERVAL` and keeps `reconnect.max >= reconnect.base`.
    /// `RealtimeSession::start` applies this to whatever it is given.
    pub fn sanitized(mut self) -> Self {
        self.heartbeat_interval = self.heartbeat_interval.max(MIN_INTERVAL);
        self.prune_interval = self.prune_interval.max(MIN_INTERVAL);
        self.reconnect.base = self.reconnect.base.max(MIN_INTERVAL);
        self.reconnect.max = self.reconnect.max.max(self.reconnect.base);
        self.feed_capacity = self.feed_capacity.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct StatusServerConfig {
    pub admin_token: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub realtime: RealtimeConfig,
    /// Present only when an admin token is configured.
    pub status: Option<StatusServerConfig>,
    /// Intent the binary registers for itself on startup.
    pub subscribe: Option<SubscriptionIntent>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("TRONSTREAM_WS_URL")
            .ok_or(RealtimeError::MissingConfig("TRONSTREAM_WS_URL"))?;
        let token = lookup("TRONSTREAM_AUTH_TOKEN");
        let mut realtime = RealtimeConfig::new(&url, token.as_deref())?;

        let base_ms = parse_or(&lookup, "TRONSTREAM_RECONNECT_BASE_MS", millis(DEFAULT_RECONNECT_BASE))?;
        let max_ms = parse_or(&lookup, "TRONSTREAM_RECONNECT_MAX_MS", millis(DEFAULT_RECONNECT_MAX))?;
        if base_ms == 0 || max_ms < base_ms {
            return Err(RealtimeError::InvalidConfig {
                key: "TRONSTREAM_RECONNECT_MAX_MS",
                value: format!("base {}ms / max {}ms", base_ms, max_ms),
            });
        }
        realtime.reconnect =
            ReconnectPolicy::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms));

        realtime.heartbeat_interval = Duration::from_secs(positive(
            &lookup,
            "TRONSTREAM_HEARTBEAT_SECONDS",
            DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
        )?);
        realtime.feed_capacity = positive(&lookup, "TRONSTREAM_FEED_CAPACITY", DEFAULT_FEED_CAPACITY)?;
        realtime.alert_window = Duration::from_secs(positive(
            &lookup,
            "TRONSTREAM_ALERT_WINDOW_SECONDS",
            DEFAULT_ALERT_WINDOW_SECS as u64,
        )?);
        realtime.prune_interval = Duration::from_secs(positive(
            &lookup,
            "TRONSTREAM_PRUNE_SECONDS",
            DEFAULT_PRUNE_INTERVAL.as_secs(),
        )?);

        let status = match lookup("TRONSTREAM_ADMIN_TOKEN").filter(|t| !t.is_empty()) {
            Some(admin_token) => Some(StatusServerConfig {
                admin_token,
                port: parse_or(&lookup, "TRONSTREAM_PORT", DEFAULT_PORT)?,
            }),
            None => None,
        };

        let subscribe = match lookup("TRONSTREAM_SUBSCRIBE") {
            Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
                RealtimeError::InvalidConfig {
                    key: "TRONSTREAM_SUBSCRIBE",
                    value: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            realtime,
            status,
            subscribe,
        })
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| RealtimeError::InvalidConfig { key, value: raw }),
        None => Ok(default),
    }
}

fn positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + ToString,
{
    let value = parse_or(lookup, key, default)?;
    if value <= T::default() {
        return Err(RealtimeError::InvalidConfig {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}
