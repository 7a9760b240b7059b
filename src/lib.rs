//! ticker-feed: Real-time crypto price feed client
//!
//! This library provides:
//! - A WebSocket transport with ping/pong keepalive
//! - A price feed client with symbol subscriptions that survive reconnects
//! - Multicast delivery of price and connection events to listeners
//! - Exponential reconnect backoff with a failure ceiling
//! - TOML configuration, structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod feed;
pub mod telemetry;
pub mod ws;
