//! Feed lifecycle integration tests against a local mock server.
//!
//! Covers:
//! - Connection and authentication
//! - Subscription frames
//! - Price updates reaching the engine and firing alerts
//! - Reconnection with subscription replay
//! - Application start/stop

mod integration;
use integration::common::mock_ws::MockWsServer;

use mw_bot::{AppConfig, Application};
use mw_core::{AlertCondition, ItemId, Price};
use mw_watch::{PriceWatcher, WatchConfig};
use mw_ws::{ConnectionState, FeedClient, FeedConfig, StaticCredentials, SubscriptionParams};
use rust_decimal_macros::dec;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Poll `check` every 25ms until it holds or `limit` elapses.
async fn wait_until<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(limit, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok()
}

fn feed_config(server: &MockWsServer) -> FeedConfig {
    FeedConfig {
        url: server.url(),
        max_reconnect_attempts: 3,
        handshake_timeout_ms: 2_000,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_feed_connects_and_authenticates() {
    let server = MockWsServer::start().await;
    let client = Arc::new(
        FeedClient::new(feed_config(&server))
            .with_credentials(Arc::new(StaticCredentials::new("test-key"))),
    );

    assert!(client.connect().await);
    assert_eq!(client.state(), ConnectionState::Authenticating);

    let listener = {
        let client = client.clone();
        tokio::spawn(async move { client.listen().await })
    };

    let (srv, feed) = (&server, &client);
    assert!(
        wait_until(Duration::from_secs(2), move || async move { feed.is_authenticated() }).await,
        "auth ack should be processed"
    );
    assert_eq!(client.state(), ConnectionState::Listening);

    let auth = srv.received_of_type("auth").await;
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0]["apiKey"], "test-key");
    assert!(auth[0]["timestamp"].is_string());

    client.close().await;
    timeout(Duration::from_secs(2), listener).await.unwrap().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.shutdown().await;
}

#[tokio::test]
async fn test_subscribe_frames_reach_server() {
    let server = MockWsServer::start().await;
    let client = FeedClient::new(feed_config(&server));

    assert!(client.connect().await);
    assert_eq!(client.state(), ConnectionState::Listening);

    let mut params = SubscriptionParams::new();
    params.insert("category".to_string(), "knives".into());
    assert!(client.subscribe("market_update", params).await);
    assert!(client.subscribe("item_update", SubscriptionParams::new()).await);

    let srv = &server;
    assert!(
        wait_until(Duration::from_secs(2), move || async move {
            srv.received_of_type("subscribe").await.len() == 2
        })
        .await
    );

    let frames = server.received_of_type("subscribe").await;
    assert_eq!(frames[0]["topic"], "market_update");
    assert_eq!(frames[0]["params"]["category"], "knives");
    assert_eq!(frames[1]["topic"], "item_update");
    assert!(frames[1].get("params").is_none());
    assert!(server.received_of_type("auth").await.is_empty());

    client.close().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_market_update_fires_alert() {
    let server = MockWsServer::start().await;
    let client = Arc::new(FeedClient::new(feed_config(&server)));
    let watcher = Arc::new(PriceWatcher::new(WatchConfig::default(), client));

    let item = ItemId::new("karambit");
    watcher.watch_item(item.clone(), Some(Price::new(dec!(10.00))));
    let alert =
        watcher.add_price_alert(item.clone(), AlertCondition::Below, Price::new(dec!(9.00)));

    assert!(watcher.start().await);
    let (engine, item_ref) = (&watcher, &item);

    server.broadcast(
        serde_json::json!({
            "type": "market_update",
            "data": {"items": [{"id": "karambit", "price": 850, "title": "Karambit | Fade"}]}
        })
        .to_string(),
    );

    assert!(
        wait_until(Duration::from_secs(2), move || async move {
            engine.get_current_price(item_ref) == Some(Price::new(dec!(8.50)))
        })
        .await,
        "feed update should reach the engine"
    );
    assert!(watcher.alert(alert).unwrap().triggered);
    assert_eq!(watcher.get_price_history(&item, None).len(), 2);
    assert_eq!(
        watcher.get_item_metadata(&item).unwrap().title.as_deref(),
        Some("Karambit | Fade")
    );

    watcher.stop().await;
    assert!(!watcher.is_running());
    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_and_replays_subscriptions() {
    let server = MockWsServer::start().await;
    let client = Arc::new(FeedClient::new(feed_config(&server)));

    assert!(client.connect().await);
    assert!(client.subscribe("market_update", SubscriptionParams::new()).await);

    let listener = {
        let client = client.clone();
        tokio::spawn(async move { client.listen().await })
    };

    let (srv, feed) = (&server, &client);
    assert!(
        wait_until(Duration::from_secs(2), move || async move {
            srv.received_of_type("subscribe").await.len() == 1
        })
        .await
    );

    server.drop_connections();

    // First backoff step is 2s
    assert!(
        wait_until(Duration::from_secs(6), move || async move {
            srv.connection_count().await == 2
                && srv.received_of_type("subscribe").await.len() == 2
        })
        .await,
        "client should reconnect and replay its subscription"
    );
    assert!(
        wait_until(Duration::from_secs(2), move || async move { feed.is_connected() }).await
    );
    assert_eq!(client.reconnect_attempt(), 0);
    assert!(client.is_running());

    client.close().await;
    timeout(Duration::from_secs(2), listener).await.unwrap().unwrap();
    server.shutdown().await;
}

#[tokio::test]
async fn test_application_start_stop() {
    let server = MockWsServer::start().await;
    let config = AppConfig::from_toml(&format!(
        r#"
api_key_env = "MW_BOT_INTEGRATION_UNSET_KEY"

[feed]
url = "{}"
handshake_timeout_ms = 2000

[[subscriptions]]
topic = "market_update"

[[items]]
id = "sticker-42"
alerts = [{{ condition = "above", target = "1.00" }}]
"#,
        server.url()
    ))
    .unwrap();

    let app = Application::new(config).unwrap();
    app.start().await.unwrap();
    assert!(app.watcher().is_running());

    let (srv, engine) = (&server, app.watcher());
    assert!(
        wait_until(Duration::from_secs(2), move || async move {
            srv.received_of_type("subscribe").await.len() == 1
        })
        .await
    );

    server.broadcast(
        r#"{"type":"market_update","data":{"items":[{"id":"sticker-42","price":125}]}}"#,
    );
    assert!(
        wait_until(Duration::from_secs(2), move || async move {
            engine.status().triggered_alerts == 1
        })
        .await
    );

    app.stop().await;
    let status = app.watcher().status();
    assert!(!status.running);
    assert_eq!(status.connection_state, ConnectionState::Disconnected);
    server.shutdown().await;
}
