//! Price feed error types

use crate::ws::WsError;
use thiserror::Error;

/// Errors raised inside the price feed client.
///
/// None of these reach consumers of [`super::PriceFeedClient`]; they are
/// logged and reflected through the connection signal.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] WsError),

    #[error("Not connected")]
    NotConnected,
}
