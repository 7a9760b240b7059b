//! CLI interface for ticker-feed
//!
//! Provides subcommands for:
//! - `watch`: Stream live prices for a set of symbols
//! - `endpoint`: Show the derived WebSocket URL
//! - `config`: Show the effective configuration

mod watch;

pub use watch::WatchArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ticker-feed")]
#[command(about = "Real-time crypto price feed client")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream live prices
    Watch(WatchArgs),
    /// Show the derived WebSocket URL
    Endpoint,
    /// Show configuration
    Config,
}
