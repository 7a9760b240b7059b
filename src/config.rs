//! Configuration types for ticker-feed

use crate::feed::{Backoff, FeedConfig, SubscriptionPolicy};
use crate::telemetry::LogFormat;
use crate::ws::WsConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default path of the price stream relative to the API host
pub const DEFAULT_STREAM_PATH: &str = "/ws/prices";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub feed: FeedSettings,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Price feed configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// HTTP base URL of the REST API (e.g., "http://localhost:8080/api")
    pub api_base_url: String,

    /// Price stream path that replaces the API path segment
    #[serde(default = "default_stream_path")]
    pub stream_path: String,

    /// Explicit WebSocket URL, bypassing derivation from `api_base_url`
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Symbols to watch when none are given on the command line
    #[serde(default)]
    pub symbols: Vec<String>,

    #[serde(default)]
    pub subscription_policy: SubscriptionPolicy,

    /// Consecutive failed attempts before giving up (0 = infinite)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_stream_path() -> String {
    DEFAULT_STREAM_PATH.to_string()
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_ping_interval_secs() -> u64 {
    30
}

impl FeedSettings {
    /// WebSocket URL of the price stream
    pub fn endpoint(&self) -> Result<String, ConfigError> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => derive_ws_url(&self.api_base_url, &self.stream_path),
        }
    }

    /// Build the client configuration
    pub fn to_feed_config(&self) -> Result<FeedConfig, ConfigError> {
        let ws = WsConfig::default()
            .connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .ping_interval(Duration::from_secs(self.ping_interval_secs));

        let mut config = FeedConfig::new(self.endpoint()?)
            .policy(self.subscription_policy)
            .ws(ws);
        config.backoff = Backoff {
            base: Duration::from_millis(self.reconnect_base_delay_ms),
            max: Duration::from_millis(self.reconnect_max_delay_ms),
            max_attempts: self.max_reconnect_attempts,
        };
        Ok(config)
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Port for the Prometheus scrape endpoint; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

/// Derive the price stream URL from the HTTP API base.
///
/// `http` becomes `ws` and `https` becomes `wss`. A trailing `/api` path
/// segment is replaced by `stream_path`; otherwise `stream_path` is appended.
pub fn derive_ws_url(api_base_url: &str, stream_path: &str) -> Result<String, ConfigError> {
    let mut url = Url::parse(api_base_url).map_err(|e| ConfigError::InvalidUrl {
        url: api_base_url.to_string(),
        reason: e.to_string(),
    })?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_string()))?;

    let base_path = url.path().trim_end_matches('/');
    let base_path = base_path.strip_suffix("/api").unwrap_or(base_path);
    let path = format!("{}/{}", base_path, stream_path.trim_start_matches('/'));
    url.set_path(&path);

    Ok(url.to_string())
}
