//! Prometheus metrics

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Text frames received from the feed
    MessagesReceived,
    /// Price updates dispatched to listeners
    PriceUpdates,
    /// Frames that failed to decode
    ParseErrors,
    /// Reconnects scheduled after a failure
    ReconnectAttempts,
    /// Listeners that panicked during dispatch
    ListenerPanics,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// 1 while the link is open
    Connected,
    /// Number of subscribed symbols
    Subscriptions,
}

impl CounterMetric {
    pub fn name(self) -> &'static str {
        match self {
            CounterMetric::MessagesReceived => "ticker_feed_messages_total",
            CounterMetric::PriceUpdates => "ticker_feed_price_updates_total",
            CounterMetric::ParseErrors => "ticker_feed_parse_errors_total",
            CounterMetric::ReconnectAttempts => "ticker_feed_reconnect_attempts_total",
            CounterMetric::ListenerPanics => "ticker_feed_listener_panics_total",
        }
    }
}

impl GaugeMetric {
    pub fn name(self) -> &'static str {
        match self {
            GaugeMetric::Connected => "ticker_feed_connected",
            GaugeMetric::Subscriptions => "ticker_feed_subscriptions",
        }
    }
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    ::metrics::counter!(metric.name()).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

/// Install the Prometheus recorder with an HTTP scrape endpoint on `port`
pub fn install_prometheus(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
