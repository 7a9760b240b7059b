//! WebSocket transport
//!
//! Opens single connections and exposes them as channel pairs. The transport
//! answers protocol pings and enforces a pong heartbeat; reconnection is left
//! to the caller.

mod client;
mod types;

pub use client::{Transport, WsTransport};
pub use types::{WsConfig, WsError, WsFrame, WsLink};
