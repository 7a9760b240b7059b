//! Wire protocol of the price stream
//!
//! Client requests carry an `action` discriminator, server messages a `type`
//! discriminator. Both are JSON text frames.

use super::error::FeedError;
use super::types::PriceUpdate;
use serde::{Deserialize, Serialize};

/// Requests sent to the price feed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { symbols: Vec<String> },
    Unsubscribe { symbols: Vec<String> },
    Ping,
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, FeedError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Messages pushed by the price feed server
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        #[serde(default)]
        message: String,
    },
    SubscriptionConfirmed {
        #[serde(default)]
        symbols: Vec<String>,
    },
    UnsubscriptionConfirmed {
        #[serde(default)]
        symbols: Vec<String>,
    },
    PriceUpdate {
        symbol: String,
        data: PriceData,
    },
    Pong,
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any `type` this client does not know about
    #[serde(other)]
    Unknown,
}

/// Payload nested under `data` in a `price_update` message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceData {
    pub price: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default, rename = "change24h")]
    pub change_24h: Option<f64>,
    pub exchange: String,
    pub timestamp: f64,
}

impl PriceData {
    /// Attach the (normalized) symbol to build the listener-facing update
    pub fn into_update(self, symbol: &str) -> PriceUpdate {
        PriceUpdate {
            symbol: symbol.trim().to_uppercase(),
            price: self.price,
            volume: self.volume,
            change_24h: self.change_24h,
            exchange: self.exchange,
            timestamp: self.timestamp,
        }
    }
}

/// Parse one text frame from the server
pub fn decode_message(text: &str) -> Result<ServerMessage, FeedError> {
    Ok(serde_json::from_str(text)?)
}
