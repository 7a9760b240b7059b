//! In-memory transport for driving the price feed client in tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use ticker_feed::feed::{FeedConfig, PriceFeedClient};
use ticker_feed::ws::{Transport, WsError, WsFrame, WsLink};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

const WAIT: Duration = Duration::from_secs(600);

struct MockState {
    accepting: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<MockServer>,
}

/// Transport handed to the client; every accepted attempt yields a [`MockServer`]
pub struct MockTransport {
    state: Arc<MockState>,
}

/// Test-side control of the transport
pub struct MockHandle {
    state: Arc<MockState>,
    servers: mpsc::UnboundedReceiver<MockServer>,
}

/// Server end of one accepted connection
pub struct MockServer {
    frames: mpsc::Sender<WsFrame>,
    sent: mpsc::UnboundedReceiver<String>,
}

pub fn mock_transport(accepting: bool) -> (MockTransport, MockHandle) {
    let (servers_tx, servers_rx) = mpsc::unbounded_channel();
    let state = Arc::new(MockState {
        accepting: AtomicBool::new(accepting),
        attempts: Mutex::new(Vec::new()),
        servers: servers_tx,
    });
    (
        MockTransport {
            state: Arc::clone(&state),
        },
        MockHandle {
            state,
            servers: servers_rx,
        },
    )
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<WsLink, WsError> {
        self.state.attempts.lock().push(Instant::now());

        if !self.state.accepting.load(Ordering::SeqCst) {
            return Err(WsError::ConnectionFailed("connection refused".into()));
        }

        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let _ = self.state.servers.send(MockServer {
            frames: frames_tx,
            sent: sent_rx,
        });
        Ok(WsLink::new(frames_rx, sent_tx))
    }
}

impl MockHandle {
    pub fn set_accepting(&self, accepting: bool) {
        self.state.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.lock().len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.attempts.lock().clone()
    }

    pub async fn next_server(&mut self) -> MockServer {
        timeout(WAIT, self.servers.recv())
            .await
            .expect("no connection attempt accepted")
            .expect("transport dropped")
    }
}

impl MockServer {
    pub async fn push(&self, text: &str) {
        self.frames
            .send(WsFrame::Text(text.to_string()))
            .await
            .expect("client dropped the link");
    }

    pub async fn close(&self, reason: &str) {
        let _ = self.frames.send(WsFrame::Closed(reason.to_string())).await;
    }

    /// Next message the client sent, parsed as JSON
    pub async fn recv_json(&mut self) -> serde_json::Value {
        let text = timeout(WAIT, self.sent.recv())
            .await
            .expect("client sent nothing")
            .expect("client closed the link");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.sent.try_recv().ok()
    }

    /// Wait until the client drops its writer, discarding anything still queued
    pub async fn wait_closed(&mut self) {
        timeout(WAIT, async { while self.sent.recv().await.is_some() {} })
            .await
            .expect("client kept the link open");
    }
}

pub fn feed_config() -> FeedConfig {
    FeedConfig::new("ws://mock.local/ws/prices")
}

/// Forward connection changes into a channel
pub fn connection_events(client: &PriceFeedClient) -> mpsc::UnboundedReceiver<bool> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.on_connection_change(move |connected| {
        let _ = tx.send(connected);
    });
    rx
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<bool>) -> Option<bool> {
    timeout(WAIT, events.recv())
        .await
        .expect("no connection event")
}

pub fn price_update_json(symbol: &str, price: f64) -> String {
    serde_json::json!({
        "type": "price_update",
        "symbol": symbol,
        "data": {
            "price": price,
            "volume": 10.5,
            "change24h": -2.25,
            "exchange": "bybit",
            "timestamp": 1704067200123i64
        }
    })
    .to_string()
}
