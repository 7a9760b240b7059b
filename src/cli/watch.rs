//! Watch command implementation

use crate::config::Config;
use crate::feed::{PriceFeedClient, PriceUpdate};
use chrono::Local;
use clap::Args;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Symbols to watch (defaults to feed.symbols from the config)
    pub symbols: Vec<String>,

    /// Send an application ping every N seconds
    #[arg(long)]
    pub ping_secs: Option<u64>,

    /// Print updates as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let symbols = if self.symbols.is_empty() {
            config.feed.symbols.clone()
        } else {
            self.symbols.clone()
        };
        if symbols.is_empty() {
            anyhow::bail!("No symbols to watch: pass them as arguments or set feed.symbols");
        }

        let client = PriceFeedClient::connect(config.feed.to_feed_config()?);

        let json = self.json;
        client.on_price_update(move |symbol, update| {
            if json {
                match serde_json::to_string(update) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode update"),
                }
            } else {
                println!("{}", format_update(symbol, update));
            }
        });
        client.on_connection_change(|connected| {
            if connected {
                tracing::info!("Price feed online");
            } else {
                tracing::warn!("Price feed offline");
            }
        });

        tracing::info!(?symbols, url = client.url(), "Watching prices");
        client.subscribe(symbols);

        let mut keepalive = self.ping_secs.map(|secs| {
            let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            interval
        });

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                    break;
                }
                _ = async {
                    match &mut keepalive {
                        Some(interval) => {
                            interval.tick().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    client.ping();
                }
            }
        }

        client.disconnect();
        Ok(())
    }
}

fn format_update(symbol: &str, update: &PriceUpdate) -> String {
    let change = update
        .change_24h
        .map(|c| format!("{:+.2}%", c))
        .unwrap_or_else(|| "-".to_string());
    let volume = update
        .volume
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} {:<8} {:>14.4} {:>9} vol {:>14} [{}]",
        Local::now().format("%H:%M:%S%.3f"),
        symbol,
        update.price,
        change,
        volume,
        update.exchange
    )
}
