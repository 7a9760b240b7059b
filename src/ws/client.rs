//! WebSocket transport backed by tokio-tungstenite

use super::types::{WsConfig, WsError, WsFrame, WsLink};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Something that can open a bidirectional text channel to a URL.
///
/// Each call to [`Transport::open`] is one connection attempt; reconnection
/// policy belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new link, or fail the attempt
    async fn open(&self, url: &str) -> Result<WsLink, WsError>;
}

/// WebSocket transport with protocol-level ping/pong keepalive
#[derive(Debug, Clone, Default)]
pub struct WsTransport {
    config: WsConfig,
}

impl WsTransport {
    /// Create a new transport with the given configuration
    pub fn new(config: WsConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, url: &str) -> Result<WsLink, WsError> {
        tracing::info!(url, "Connecting to WebSocket");

        let (ws_stream, _response) =
            tokio::time::timeout(self.config.connect_timeout, connect_async(url))
                .await
                .map_err(|_| WsError::ConnectTimeout(self.config.connect_timeout))??;

        tracing::info!(url, "WebSocket connected");

        let (in_tx, in_rx) = mpsc::channel(self.config.buffer_size);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            let reason = match pump(ws_stream, &in_tx, out_rx, ping_interval).await {
                Ok(()) => "connection closed".to_string(),
                Err(e) => e.to_string(),
            };
            tracing::debug!(reason = %reason, "WebSocket pump stopped");
            let _ = in_tx.send(WsFrame::Closed(reason)).await;
        });

        Ok(WsLink::new(in_rx, out_tx))
    }
}

/// Shuttle frames between the socket and the link channels until either side goes away
async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    in_tx: &mpsc::Sender<WsFrame>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    ping_interval: Duration,
) -> Result<(), WsError> {
    let (mut write, mut read) = ws_stream.split();

    let mut ping_timer = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Pong timeout tracking
    let mut waiting_for_pong = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(WsFrame::Text(text)).await.is_err() {
                            tracing::debug!("Link dropped, closing connection");
                            let _ = write.send(Message::Close(None)).await;
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        waiting_for_pong = false;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Received close frame");
                        return Ok(());
                    }
                    Some(Ok(_)) => {
                        // The price feed speaks text only
                    }
                    Some(Err(e)) => {
                        return Err(e.into());
                    }
                    None => {
                        return Err(WsError::ConnectionFailed("Stream ended unexpectedly".into()));
                    }
                }
            }

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(text) => {
                        write.send(Message::Text(text)).await
                            .map_err(|e| WsError::SendFailed(e.to_string()))?;
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }

            _ = ping_timer.tick() => {
                if waiting_for_pong {
                    return Err(WsError::HeartbeatTimeout);
                }
                write.send(Message::Ping(Vec::new())).await
                    .map_err(|e| WsError::SendFailed(e.to_string()))?;
                waiting_for_pong = true;
            }
        }
    }
}
