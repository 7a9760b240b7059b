//! WebSocket transport types and configuration

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Maximum time allowed for the TCP/TLS/WebSocket handshake
    pub connect_timeout: Duration,
    /// Interval for sending protocol ping frames
    pub ping_interval: Duration,
    /// Buffer size of the incoming frame channel
    pub buffer_size: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            buffer_size: 1024,
        }
    }
}

impl WsConfig {
    /// Set the handshake timeout
    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }

    /// Set the incoming frame buffer size
    pub fn buffer_size(mut self, n: usize) -> Self {
        self.buffer_size = n;
        self
    }
}

/// Events delivered from an open link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsFrame {
    /// Text message from the server
    Text(String),
    /// The link is gone; carries a human-readable reason
    Closed(String),
}

/// One live connection, exposed as a pair of channels.
///
/// Dropping the link (or every clone of `outgoing`) closes the socket.
#[derive(Debug)]
pub struct WsLink {
    /// Frames received from the server, terminated by [`WsFrame::Closed`]
    pub incoming: mpsc::Receiver<WsFrame>,
    /// Text frames to write to the server
    pub outgoing: mpsc::UnboundedSender<String>,
}

impl WsLink {
    pub fn new(
        incoming: mpsc::Receiver<WsFrame>,
        outgoing: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self { incoming, outgoing }
    }
}

/// WebSocket errors
#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    #[error("Connection closed")]
    Closed,

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}
