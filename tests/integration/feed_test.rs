//! Integration tests for the price feed client

use crate::common::{
    connection_events, feed_config, mock_transport, next_event, price_update_json,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticker_feed::feed::{ConnectionState, PriceFeedClient, PriceUpdate, SubscriptionPolicy};
use tokio::sync::mpsc;

const LONG: Duration = Duration::from_secs(3600);

fn price_channel(
    client: &PriceFeedClient,
) -> (
    ticker_feed::feed::ListenerHandle,
    mpsc::UnboundedReceiver<(String, PriceUpdate)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = client.on_price_update(move |symbol, update| {
        let _ = tx.send((symbol.to_string(), update.clone()));
    });
    (handle, rx)
}

#[tokio::test(start_paused = true)]
async fn test_not_connected_before_first_open() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);

    assert!(!client.is_connected());
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    let _server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));
    assert!(client.is_connected());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_status_matches_notifications() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let observer = client.handle();
    let log = Arc::clone(&seen);
    client.on_connection_change(move |connected| {
        log.lock().push((connected, observer.is_connected()));
        let _ = done_tx.send(());
    });

    let server = mock.next_server().await;
    done_rx.recv().await;
    server.close("network drop").await;
    done_rx.recv().await;

    assert_eq!(*seen.lock(), vec![(true, true), (false, false)]);
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_replayed_after_reconnect() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);

    client.subscribe(["btc", "eth"]);

    let mut server = mock.next_server().await;
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["BTC", "ETH"]})
    );
    assert_eq!(next_event(&mut events).await, Some(true));

    client.subscribe("sol");
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["SOL"]})
    );

    server.close("network drop").await;
    assert_eq!(next_event(&mut events).await, Some(false));
    assert!(!client.is_connected());
    assert_eq!(client.subscriptions(), vec!["BTC", "ETH", "SOL"]);

    let mut server = mock.next_server().await;
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["BTC", "ETH", "SOL"]})
    );
    assert_eq!(next_event(&mut events).await, Some(true));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.try_recv().is_none(), "replay must be a single message");

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_no_replay_for_empty_set() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);

    let mut server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.try_recv().is_none());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_price_update_reaches_every_listener() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let (_first, mut first_rx) = price_channel(&client);
    let (_second, mut second_rx) = price_channel(&client);

    client.subscribe("eth");
    let server = mock.next_server().await;
    server.push(&price_update_json("eth", 3120.5)).await;

    let expected = PriceUpdate {
        symbol: "ETH".to_string(),
        price: 3120.5,
        volume: Some(10.5),
        change_24h: Some(-2.25),
        exchange: "bybit".to_string(),
        timestamp: 1704067200123.0,
    };
    for rx in [&mut first_rx, &mut second_rx] {
        let (symbol, update) = rx.recv().await.unwrap();
        assert_eq!(symbol, "ETH");
        assert_eq!(update, expected);
        assert!(rx.try_recv().is_err(), "exactly one call per update");
    }

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_disposed_listener_stops_receiving() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let (first, mut first_rx) = price_channel(&client);
    let (_second, mut second_rx) = price_channel(&client);

    let server = mock.next_server().await;
    server.push(&price_update_json("BTC", 100.0)).await;
    assert!(first_rx.recv().await.is_some());
    assert!(second_rx.recv().await.is_some());

    assert!(first.dispose());
    assert!(!first.dispose());
    assert_eq!(client.price_listener_count(), 1);

    server.push(&price_update_json("BTC", 101.0)).await;
    let (_, update) = second_rx.recv().await.unwrap();
    assert_eq!(update.price, 101.0);
    // The registry dropped the disposed closure, closing its channel
    assert!(first_rx.recv().await.is_none());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_listener_does_not_block_others() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    client.on_price_update(|_, _| panic!("listener bug"));
    let (_handle, mut rx) = price_channel(&client);

    let server = mock.next_server().await;
    server.push(&price_update_json("btc", 1.0)).await;
    server.push(&price_update_json("btc", 2.0)).await;

    assert_eq!(rx.recv().await.unwrap().1.price, 1.0);
    assert_eq!(rx.recv().await.unwrap().1.price, 2.0);
    assert!(client.is_connected());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_bad_messages_are_dropped() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let (_handle, mut rx) = price_channel(&client);

    let server = mock.next_server().await;
    server.push("definitely not json").await;
    server.push(r#"{"type":"candle","symbol":"BTC"}"#).await;
    server.push(r#"{"type":"error","message":"unknown symbol DOGE"}"#).await;
    server.push(r#"{"type":"price_update","symbol":"BTC"}"#).await;
    server.push(&price_update_json("btc", 42.0)).await;

    let (symbol, update) = rx.recv().await.unwrap();
    assert_eq!(symbol, "BTC");
    assert_eq!(update.price, 42.0);
    assert!(rx.try_recv().is_err());
    assert!(client.is_connected());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_fractional_timestamp_is_delivered() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let (_handle, mut rx) = price_channel(&client);

    let server = mock.next_server().await;
    server
        .push(r#"{"type":"price_update","symbol":"btc","data":{"price":1.0,"exchange":"x","timestamp":1234567890.5}}"#)
        .await;
    server.push(&price_update_json("btc", 2.0)).await;

    let (symbol, update) = rx.recv().await.unwrap();
    assert_eq!(symbol, "BTC");
    assert_eq!(update.price, 1.0);
    assert_eq!(update.timestamp, 1234567890.5);
    assert_eq!(rx.recv().await.unwrap().1.price, 2.0);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_ping_sent_only_when_open() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);

    // Still connecting: silently dropped
    client.ping();

    let mut server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));

    client.ping();
    assert_eq!(server.recv_json().await, json!({"action": "ping"}));
    server.push(r#"{"type":"pong"}"#).await;

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_five_failures_then_stop() {
    let (transport, mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);

    tokio::time::sleep(LONG).await;

    assert_eq!(mock.attempts(), 5);
    assert!(!client.is_connected());
    assert_eq!(client.connection_state(), ConnectionState::Closed);

    let mut notifications = Vec::new();
    while let Ok(connected) = events.try_recv() {
        notifications.push(connected);
    }
    assert_eq!(notifications, vec![false; 5]);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_delays_increase() {
    let (transport, mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    tokio::time::sleep(LONG).await;

    let times = mock.attempt_times();
    assert_eq!(times.len(), 5);
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps.windows(2).all(|w| w[0] < w[1]), "gaps: {:?}", gaps);
    assert!(gaps[0] >= Duration::from_secs(1));
    assert!(gaps[3] >= Duration::from_secs(8));

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_after_ceiling_reconnects() {
    let (transport, mut mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    tokio::time::sleep(LONG).await;
    assert_eq!(mock.attempts(), 5);

    mock.set_accepting(true);
    client.subscribe("btc");

    let mut server = mock.next_server().await;
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["BTC"]})
    );
    assert_eq!(mock.attempts(), 6);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_ping_after_ceiling_reconnects() {
    let (transport, mut mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    tokio::time::sleep(LONG).await;
    mock.set_accepting(true);
    client.ping();

    let _server = mock.next_server().await;
    assert_eq!(mock.attempts(), 6);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_without_ceiling_does_not_reconnect() {
    let (transport, mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    tokio::time::sleep(LONG).await;
    mock.set_accepting(true);
    client.unsubscribe("btc");
    tokio::time::sleep(LONG).await;

    assert_eq!(mock.attempts(), 5);
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_tears_everything_down() {
    let (transport, mut mock) = mock_transport(true);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    let mut events = connection_events(&client);
    let (_handle, _rx) = price_channel(&client);

    client.subscribe(["btc", "eth"]);
    let mut server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));

    client.disconnect();

    assert!(!client.is_connected());
    assert!(client.subscriptions().is_empty());
    assert_eq!(client.price_listener_count(), 0);
    assert_eq!(client.connection_listener_count(), 0);

    server.wait_closed().await;
    // Listener was removed before the close, so no `false` notification
    assert_eq!(next_event(&mut events).await, None);

    tokio::time::sleep(LONG).await;
    assert_eq!(mock.attempts(), 1);

    client.subscribe("sol");
    assert!(client.subscriptions().is_empty());

    // Idempotent
    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_backoff() {
    let (transport, mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(mock.attempts(), 1);

    client.disconnect();
    tokio::time::sleep(LONG).await;
    assert_eq!(mock.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_stops_task() {
    let (transport, mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);
    drop(client);

    tokio::time::sleep(LONG).await;
    assert!(mock.attempts() <= 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_client_stops_task_when_listener_holds_handle() {
    let (transport, mock) = mock_transport(false);
    let config = feed_config().max_reconnects(0);
    let client = PriceFeedClient::with_transport(config, transport);

    let captured = Arc::new(());
    let inner = client.handle();
    let token = Arc::clone(&captured);
    client.on_connection_change(move |_| {
        let _ = (inner.is_connected(), &token);
    });
    let outside = client.handle();

    drop(client);
    tokio::time::sleep(LONG).await;

    assert!(mock.attempts() <= 1);
    assert_eq!(Arc::strong_count(&captured), 1);
    assert_eq!(outside.connection_state(), ConnectionState::Closed);
    assert_eq!(outside.connection_listener_count(), 0);

    outside.subscribe("btc");
    assert!(outside.subscriptions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refcounted_subscriptions_across_consumers() {
    let (transport, mut mock) = mock_transport(true);
    let config = feed_config().policy(SubscriptionPolicy::RefCounted);
    let client = PriceFeedClient::with_transport(config, transport);
    let mut events = connection_events(&client);

    let mut server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));

    // Two components want BTC
    client.subscribe("btc");
    client.subscribe("BTC");
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["BTC"]})
    );

    // First one lets go: BTC stays, nothing sent before the ping
    client.unsubscribe("btc");
    client.ping();
    assert_eq!(server.recv_json().await, json!({"action": "ping"}));
    assert_eq!(client.subscriptions(), vec!["BTC"]);

    client.unsubscribe("btc");
    assert_eq!(
        server.recv_json().await,
        json!({"action": "unsubscribe", "symbols": ["BTC"]})
    );
    assert!(client.subscriptions().is_empty());

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_shared_policy_union_semantics() {
    let (transport, mut mock) = mock_transport(true);
    let config = feed_config().policy(SubscriptionPolicy::Shared);
    let client = PriceFeedClient::with_transport(config, transport);
    let mut events = connection_events(&client);

    let mut server = mock.next_server().await;
    assert_eq!(next_event(&mut events).await, Some(true));

    client.subscribe(["btc", "eth"]);
    client.subscribe(vec!["ETH".to_string(), "sol".to_string()]);
    assert_eq!(client.subscriptions(), vec!["BTC", "ETH", "SOL"]);

    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["BTC", "ETH"]})
    );
    assert_eq!(
        server.recv_json().await,
        json!({"action": "subscribe", "symbols": ["ETH", "SOL"]})
    );

    client.unsubscribe("eth");
    assert_eq!(
        server.recv_json().await,
        json!({"action": "unsubscribe", "symbols": ["ETH"]})
    );
    assert_eq!(client.subscriptions(), vec!["BTC", "SOL"]);

    client.disconnect();
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_snapshot_is_a_copy() {
    let (transport, _mock) = mock_transport(false);
    let client = PriceFeedClient::with_transport(feed_config(), transport);

    client.subscribe(["btc", "eth"]);
    let mut snapshot = client.subscriptions();
    snapshot.push("DOGE".to_string());
    snapshot.retain(|s| s != "BTC");

    assert_eq!(client.subscriptions(), vec!["BTC", "ETH"]);
    client.disconnect();
}
