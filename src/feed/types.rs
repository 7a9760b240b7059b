//! Price feed types

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single price update pushed by the feed server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    /// Ticker symbol, always uppercase (e.g., "BTC")
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Traded volume, when the exchange reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// 24h change in percent
    #[serde(default, rename = "change24h", skip_serializing_if = "Option::is_none")]
    pub change_24h: Option<f64>,
    /// Source exchange (e.g., "bybit")
    pub exchange: String,
    /// Server timestamp, passed through untouched
    pub timestamp: f64,
}

/// Transport state as seen by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// A connection attempt is in flight
    Connecting,
    /// The link is up and messages flow
    Open,
    /// No link; a retry may be pending
    Closed,
}

impl ConnectionState {
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "CONNECTING"),
            ConnectionState::Open => write!(f, "OPEN"),
            ConnectionState::Closed => write!(f, "CLOSED"),
        }
    }
}
