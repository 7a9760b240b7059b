//! Price feed module
//!
//! Real-time price stream client: one WebSocket link, a replayable set of
//! subscribed symbols, and multicast delivery of price and connection events.

mod backoff;
mod client;
mod error;
mod listeners;
mod protocol;
mod subscriptions;
mod types;

pub use backoff::Backoff;
pub use client::{FeedConfig, FeedHandle, PriceFeedClient};
pub use error::FeedError;
pub use listeners::{ConnectionListener, ListenerHandle, ListenerRegistry, PriceListener};
pub use protocol::{decode_message, ClientMessage, PriceData, ServerMessage};
pub use subscriptions::{normalize_symbol, IntoSymbols, SubscriptionPolicy, SubscriptionSet};
pub use types::{ConnectionState, PriceUpdate};
