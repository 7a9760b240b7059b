//! Price feed client with subscription replay and automatic reconnection

use super::backoff::Backoff;
use super::error::FeedError;
use super::listeners::{ConnectionListener, ListenerHandle, ListenerRegistry, PriceListener};
use super::protocol::{decode_message, ClientMessage, ServerMessage};
use super::subscriptions::{IntoSymbols, SubscriptionPolicy, SubscriptionSet};
use super::types::{ConnectionState, PriceUpdate};
use crate::telemetry::{increment, set_gauge, CounterMetric, GaugeMetric};
use crate::ws::{Transport, WsConfig, WsError, WsFrame, WsLink, WsTransport};
use parking_lot::Mutex;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// Price feed client configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL of the price stream
    pub url: String,
    /// How overlapping subscriptions interact
    pub policy: SubscriptionPolicy,
    /// Reconnect schedule
    pub backoff: Backoff,
    /// Transport settings
    pub ws: WsConfig,
}

impl FeedConfig {
    /// Create a new config with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: SubscriptionPolicy::default(),
            backoff: Backoff::default(),
            ws: WsConfig::default(),
        }
    }

    pub fn policy(mut self, policy: SubscriptionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the consecutive failure ceiling (0 = retry forever)
    pub fn max_reconnects(mut self, n: u32) -> Self {
        self.backoff.max_attempts = n;
        self
    }

    /// Set the delay after the first failure
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.backoff.base = d;
        self
    }

    /// Set maximum reconnection delay
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.backoff.max = d;
        self
    }

    pub fn ws(mut self, ws: WsConfig) -> Self {
        self.ws = ws;
        self
    }
}

/// Mutable connection state, guarded by one lock
struct LinkState {
    state: ConnectionState,
    /// Consecutive failed attempts
    attempt: u32,
    /// Writer of the live link, present only while open
    outbound: Option<mpsc::UnboundedSender<String>>,
    subscriptions: SubscriptionSet,
    /// Reconnect ceiling reached, task parked until re-armed
    exhausted: bool,
    shut_down: bool,
}

impl LinkState {
    fn send(&self, message: &ClientMessage) -> Result<(), FeedError> {
        let outbound = self
            .outbound
            .as_ref()
            .filter(|_| self.state.is_open())
            .ok_or(FeedError::NotConnected)?;
        let text = message.to_json()?;
        outbound
            .send(text)
            .map_err(|_| FeedError::Transport(WsError::Closed))
    }

    /// Clear the exhausted flag, resetting the failure count. Returns whether it was set.
    fn take_exhausted(&mut self) -> bool {
        if !self.exhausted {
            return false;
        }
        self.exhausted = false;
        self.attempt = 0;
        true
    }
}

/// State shared between the client handles and the connection task
struct Shared {
    url: String,
    backoff: Backoff,
    link: Mutex<LinkState>,
    price_listeners: ListenerRegistry<PriceListener>,
    connection_listeners: ListenerRegistry<ConnectionListener>,
    rearm: Notify,
    shutdown: CancellationToken,
}

impl Shared {
    fn new(config: &FeedConfig, shutdown: CancellationToken) -> Self {
        Self {
            url: config.url.clone(),
            backoff: config.backoff,
            link: Mutex::new(LinkState {
                state: ConnectionState::Connecting,
                attempt: 0,
                outbound: None,
                subscriptions: SubscriptionSet::new(config.policy),
                exhausted: false,
                shut_down: false,
            }),
            price_listeners: ListenerRegistry::new("price"),
            connection_listeners: ListenerRegistry::new("connection"),
            rearm: Notify::new(),
            shutdown,
        }
    }

    fn subscribe(&self, symbols: Vec<String>) {
        let rearm = {
            let mut link = self.link.lock();
            if link.shut_down {
                tracing::debug!("Ignoring subscribe on disconnected client");
                return;
            }
            let announce = link.subscriptions.add(symbols);
            set_gauge(GaugeMetric::Subscriptions, link.subscriptions.len() as f64);

            if !announce.is_empty() {
                tracing::debug!(symbols = ?announce, state = %link.state, "Subscribing");
                match link.send(&ClientMessage::Subscribe { symbols: announce }) {
                    Ok(()) | Err(FeedError::NotConnected) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to send subscribe"),
                }
            }
            link.take_exhausted()
        };

        if rearm {
            tracing::info!("Subscribe after exhausted reconnects, re-arming connection");
            self.rearm.notify_one();
        }
    }

    fn unsubscribe(&self, symbols: Vec<String>) {
        let mut link = self.link.lock();
        if link.shut_down {
            return;
        }
        let released = link.subscriptions.remove(symbols);
        set_gauge(GaugeMetric::Subscriptions, link.subscriptions.len() as f64);

        if released.is_empty() {
            return;
        }
        tracing::debug!(symbols = ?released, state = %link.state, "Unsubscribing");
        match link.send(&ClientMessage::Unsubscribe { symbols: released }) {
            Ok(()) | Err(FeedError::NotConnected) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to send unsubscribe"),
        }
    }

    fn ping(&self) {
        let rearm = {
            let mut link = self.link.lock();
            if link.shut_down {
                return;
            }
            if let Err(e) = link.send(&ClientMessage::Ping) {
                tracing::debug!(error = %e, "Ping skipped");
            }
            link.take_exhausted()
        };

        if rearm {
            tracing::info!("Ping after exhausted reconnects, re-arming connection");
            self.rearm.notify_one();
        }
    }

    /// Enter `Connecting`. Returns `false` once the client has been shut down.
    fn begin_attempt(&self) -> bool {
        let mut link = self.link.lock();
        if link.shut_down {
            return false;
        }
        link.state = ConnectionState::Connecting;
        true
    }

    /// Transition to `Open`, replay subscriptions, then notify listeners
    fn on_open(&self, outbound: mpsc::UnboundedSender<String>) {
        {
            let mut link = self.link.lock();
            if link.shut_down {
                return;
            }
            link.state = ConnectionState::Open;
            link.attempt = 0;
            link.outbound = Some(outbound);

            if !link.subscriptions.is_empty() {
                let symbols = link.subscriptions.snapshot();
                let count = symbols.len();
                match link.send(&ClientMessage::Subscribe { symbols }) {
                    Ok(()) => tracing::info!(count, "Replayed subscriptions"),
                    Err(e) => tracing::warn!(error = %e, "Failed to replay subscriptions"),
                }
            }
        }

        set_gauge(GaugeMetric::Connected, 1.0);
        tracing::info!(url = %self.url, "Price feed connected");
        self.notify_connection(true);
    }

    /// Transition to `Closed` and notify listeners
    fn on_closed(&self) {
        {
            let mut link = self.link.lock();
            if link.shut_down {
                return;
            }
            link.state = ConnectionState::Closed;
            link.outbound = None;
        }

        set_gauge(GaugeMetric::Connected, 0.0);
        self.notify_connection(false);
    }

    /// Count a failure and pick the next delay. `None` parks the task until re-armed.
    fn next_delay(&self) -> (u32, Option<Duration>) {
        let mut link = self.link.lock();
        link.attempt += 1;
        let delay = self.backoff.delay_for(link.attempt);
        if delay.is_none() {
            link.exhausted = true;
        }
        (link.attempt, delay)
    }

    fn handle_text(&self, text: &str) {
        increment(CounterMetric::MessagesReceived);

        let message = match decode_message(text) {
            Ok(message) => message,
            Err(e) => {
                increment(CounterMetric::ParseErrors);
                tracing::warn!(
                    error = %e,
                    msg_preview = %text.chars().take(100).collect::<String>(),
                    "Dropping malformed price feed message"
                );
                return;
            }
        };

        match message {
            ServerMessage::Welcome { message } => {
                tracing::info!(message = %message, "Price feed greeting");
            }
            ServerMessage::SubscriptionConfirmed { symbols } => {
                tracing::debug!(?symbols, "Subscription confirmed");
            }
            ServerMessage::UnsubscriptionConfirmed { symbols } => {
                tracing::debug!(?symbols, "Unsubscription confirmed");
            }
            ServerMessage::PriceUpdate { symbol, data } => {
                let update = data.into_update(&symbol);
                increment(CounterMetric::PriceUpdates);
                self.dispatch_price(&update);
            }
            ServerMessage::Pong => {
                tracing::debug!("Pong received");
            }
            ServerMessage::Error { message } => {
                tracing::warn!(message = %message, "Price feed server reported an error");
            }
            ServerMessage::Unknown => {
                tracing::debug!(
                    msg_preview = %text.chars().take(100).collect::<String>(),
                    "Ignoring unrecognized message type"
                );
            }
        }
    }

    fn dispatch_price(&self, update: &PriceUpdate) {
        self.price_listeners
            .dispatch(|listener| listener(update.symbol.as_str(), update));
    }

    fn notify_connection(&self, connected: bool) {
        self.connection_listeners
            .dispatch(|listener| listener(connected));
    }

    /// Feed frames from one link into the dispatcher until it closes
    async fn pump(&self, incoming: &mut mpsc::Receiver<WsFrame>) -> String {
        while let Some(frame) = incoming.recv().await {
            match frame {
                WsFrame::Text(text) => self.handle_text(&text),
                WsFrame::Closed(reason) => return reason,
            }
        }
        "link dropped".to_string()
    }

    fn shut_down(&self) -> bool {
        let outbound = {
            let mut link = self.link.lock();
            if link.shut_down {
                return false;
            }
            link.shut_down = true;
            link.state = ConnectionState::Closed;
            link.exhausted = false;
            link.subscriptions.clear();
            link.outbound.take()
        };

        self.connection_listeners.clear();
        self.price_listeners.clear();
        self.shutdown.cancel();
        drop(outbound);

        set_gauge(GaugeMetric::Connected, 0.0);
        set_gauge(GaugeMetric::Subscriptions, 0.0);
        true
    }
}

/// Connection task: connect, pump, back off, repeat
async fn run_connection<T: Transport>(shared: Arc<Shared>, transport: T) {
    loop {
        if !shared.begin_attempt() {
            break;
        }

        let opened = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            result = transport.open(&shared.url) => result,
        };

        match opened {
            Ok(WsLink {
                mut incoming,
                outgoing,
            }) => {
                shared.on_open(outgoing);
                let reason = tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    reason = shared.pump(&mut incoming) => reason,
                };
                tracing::warn!(reason = %reason, "Price feed connection closed");
                shared.on_closed();
            }
            Err(e) => {
                tracing::warn!(error = %e, url = %shared.url, "Price feed connection failed");
                shared.on_closed();
            }
        }

        let (attempt, delay) = shared.next_delay();
        match delay {
            Some(delay) => {
                increment(CounterMetric::ReconnectAttempts);
                tracing::info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling price feed reconnect"
                );
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                tracing::error!(attempt, "Max reconnection attempts reached, staying disconnected");
                tokio::select! {
                    _ = shared.shutdown.cancelled() => break,
                    _ = shared.rearm.notified() => {}
                }
            }
        }
    }

    tracing::debug!("Price feed connection task stopped");
}

/// Real-time price feed client.
///
/// Owns a single connection to the price stream, tracks the subscribed
/// symbols and fans updates out to any number of listeners. Construct one per
/// application with [`PriceFeedClient::connect`]. Other components and
/// listeners work through a [`FeedHandle`] from [`PriceFeedClient::handle`].
/// Dropping the client shuts the connection down even while handles are
/// still alive, so a listener may hold a handle without keeping the
/// connection running.
///
/// No method blocks or fails on network conditions: symbols subscribed while
/// disconnected are sent by the replay on the next successful open.
pub struct PriceFeedClient {
    handle: FeedHandle,
}

impl PriceFeedClient {
    /// Connect over WebSocket. Must be called within a tokio runtime.
    pub fn connect(config: FeedConfig) -> Self {
        let transport = WsTransport::new(config.ws.clone());
        Self::with_transport(config, transport)
    }

    /// Connect over a custom transport. Must be called within a tokio runtime.
    pub fn with_transport<T: Transport>(config: FeedConfig, transport: T) -> Self {
        let shared = Arc::new(Shared::new(&config, CancellationToken::new()));

        tracing::info!(
            url = %config.url,
            policy = ?config.policy,
            max_reconnects = config.backoff.max_attempts,
            "Starting price feed client"
        );
        tokio::spawn(run_connection(Arc::clone(&shared), transport));

        Self {
            handle: FeedHandle { shared },
        }
    }

    /// Cloneable handle sharing this client's connection
    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }
}

impl Deref for PriceFeedClient {
    type Target = FeedHandle;

    fn deref(&self) -> &FeedHandle {
        &self.handle
    }
}

impl Drop for PriceFeedClient {
    fn drop(&mut self) {
        // Clears the registries too, releasing handles captured by listeners
        if self.handle.shared.shut_down() {
            tracing::debug!("Price feed client dropped without disconnect");
        }
    }
}

impl std::fmt::Debug for PriceFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceFeedClient")
            .field("url", &self.handle.shared.url)
            .field("state", &self.connection_state())
            .finish()
    }
}

/// Shared access to a [`PriceFeedClient`].
///
/// Handles do not keep the connection alive. Once the owning client is
/// dropped or disconnected, every operation is a no-op.
#[derive(Clone)]
pub struct FeedHandle {
    shared: Arc<Shared>,
}

impl FeedHandle {
    /// Add symbols to the subscription set (uppercased), sending them now if open
    pub fn subscribe(&self, symbols: impl IntoSymbols) {
        self.shared.subscribe(symbols.into_symbols());
    }

    /// Remove symbols from the subscription set, sending the release now if open
    pub fn unsubscribe(&self, symbols: impl IntoSymbols) {
        self.shared.unsubscribe(symbols.into_symbols());
    }

    /// Register a price listener
    pub fn on_price_update<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&str, &PriceUpdate) + Send + Sync + 'static,
    {
        self.shared.price_listeners.register(Arc::new(listener))
    }

    /// Register a connection listener
    pub fn on_connection_change<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared.connection_listeners.register(Arc::new(listener))
    }

    /// Send an application-level keepalive if open
    pub fn ping(&self) {
        self.shared.ping();
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_open()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.link.lock().state
    }

    /// Sorted snapshot of the subscribed symbols
    pub fn subscriptions(&self) -> Vec<String> {
        self.shared.link.lock().subscriptions.snapshot()
    }

    pub fn price_listener_count(&self) -> usize {
        self.shared.price_listeners.len()
    }

    pub fn connection_listener_count(&self) -> usize {
        self.shared.connection_listeners.len()
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Close the connection for good, dropping all subscriptions and listeners
    pub fn disconnect(&self) {
        if self.shared.shut_down() {
            tracing::info!("Price feed client disconnected");
        }
    }
}

impl std::fmt::Debug for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedHandle")
            .field("url", &self.shared.url)
            .field("state", &self.connection_state())
            .finish()
    }
}
