//! Main application orchestration.
//!
//! Coordinates:
//! - Feed client with credentials from the environment
//! - REST polling fallback (when configured)
//! - Watch engine with the configured items and alerts
//! - Metrics and periodic status logging

use crate::config::{AppConfig, ItemConfig};
use crate::error::{AppError, AppResult};
use mw_core::{AlertRule, HandlerError, ItemId, ItemMetadata, Price};
use mw_rest::{MarketClient, RestConfig};
use mw_telemetry::Metrics;
use mw_watch::{EngineStatus, HandlerScope, PriceChange, PriceWatcher};
use mw_ws::{ConnectionState, CredentialProvider, EnvCredentials, FeedClient, FeedConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    watcher: Arc<PriceWatcher>,
}

impl Application {
    /// Build the engine and register configured items, alerts and handlers.
    ///
    /// Nothing connects until `start()`.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(EnvCredentials::new(config.api_key_env.clone()));
        if credentials.api_key().is_none() {
            warn!(var = %config.api_key_env, "API key not set, running unauthenticated");
        }

        let feed_config: FeedConfig = config.feed.clone().into();
        let client = Arc::new(FeedClient::new(feed_config).with_credentials(credentials.clone()));

        let mut watcher = PriceWatcher::new(config.watch.clone(), client);
        if let Some(rest) = &config.rest {
            let rest_config = RestConfig::from(rest);
            let market = MarketClient::new(&rest_config)?.with_credentials(credentials);
            info!(url = %market.prices_url(), "Polling fallback enabled");
            watcher = watcher.with_price_source(Arc::new(market));
        } else {
            info!("No [rest] section, polling fallback disabled");
        }

        let app = Self {
            config,
            watcher: Arc::new(watcher),
        };
        app.register_watchlist();
        app.register_handlers();
        Ok(app)
    }

    pub fn watcher(&self) -> &Arc<PriceWatcher> {
        &self.watcher
    }

    fn register_watchlist(&self) {
        for item in &self.config.items {
            self.register_item(item);
        }
        info!(
            items = self.config.items.len(),
            alerts = self.config.alert_count(),
            "Watchlist registered"
        );
    }

    fn register_item(&self, item: &ItemConfig) {
        let id = ItemId::new(item.id.clone());
        self.watcher.watch_item(id.clone(), item.initial_price);

        let metadata = ItemMetadata {
            title: item.title.clone(),
            category: item.category.clone(),
        };
        if !metadata.is_empty() {
            self.watcher.set_item_metadata(&id, &metadata);
        }

        for alert in &item.alerts {
            self.watcher
                .add_price_alert(id.clone(), alert.condition, alert.target);
        }
    }

    fn register_handlers(&self) {
        self.watcher.register_price_change_handler(
            Arc::new(|change: &PriceChange| -> Result<(), HandlerError> {
                Metrics::price_update(change.source.as_str());
                debug!(
                    item_id = %change.item_id,
                    price = %change.new_price,
                    source = %change.source,
                    "Price update"
                );
                Ok(())
            }),
            HandlerScope::AllItems,
        );

        let watcher = Arc::downgrade(&self.watcher);
        self.watcher.register_alert_handler(Arc::new(
            move |rule: &AlertRule, price: Price| -> Result<(), HandlerError> {
                Metrics::alert_fired(&rule.condition.to_string());
                let title = watcher
                    .upgrade()
                    .and_then(|w| w.get_item_metadata(&rule.item_id))
                    .and_then(|m| m.title);
                info!(
                    alert = %rule.id,
                    item_id = %rule.item_id,
                    title = ?title,
                    condition = %rule.condition,
                    target = %rule.target,
                    %price,
                    "ALERT: price crossed threshold"
                );
                Ok(())
            },
        ));
    }

    /// Start the engine and subscribe the configured topics.
    pub async fn start(&self) -> AppResult<()> {
        if !self.watcher.start().await {
            return Err(AppError::Startup(format!(
                "feed connection to {} failed",
                self.config.feed.url
            )));
        }

        let client = self.watcher.client();
        for subscription in &self.config.subscriptions {
            if !client
                .subscribe(&subscription.topic, subscription.params.clone())
                .await
            {
                warn!(topic = %subscription.topic, "Initial subscription failed");
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {
        self.watcher.stop().await;
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        let state_metrics = spawn_state_metrics(self.watcher.client());
        self.start().await?;

        let mut reporter = StatusReporter::default();
        let mut recovery: Option<JoinHandle<bool>> = None;
        let mut status_interval =
            tokio::time::interval(Duration::from_secs(self.config.status_interval_secs));

        info!("Entering main loop");
        loop {
            tokio::select! {
                _ = status_interval.tick() => {
                    let status = self.watcher.status();
                    reporter.report(&status);
                    let recovering = recovery.as_ref().is_some_and(|task| !task.is_finished());
                    if status.connection_state == ConnectionState::Failed && !recovering {
                        warn!("Feed failed, requesting reconnect");
                        let watcher = Arc::clone(&self.watcher);
                        recovery =
                            Some(tokio::spawn(async move { watcher.reconnect_feed().await }));
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        if let Some(task) = recovery {
            task.abort();
        }
        self.stop().await;
        reporter.report(&self.watcher.status());
        state_metrics.abort();
        info!("Shutdown complete");
        Ok(())
    }
}

/// Mirror feed state transitions into metrics.
fn spawn_state_metrics(client: &Arc<FeedClient>) -> JoinHandle<()> {
    let mut states = client.state_changes();
    tokio::spawn(async move {
        loop {
            let state = *states.borrow_and_update();
            Metrics::feed_state_set(state.as_str());
            Metrics::feed_connected(state.is_connected());
            if state == ConnectionState::Reconnecting {
                Metrics::feed_reconnect();
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Turns cumulative engine counters into metric increments and a status line.
#[derive(Debug, Default)]
pub struct StatusReporter {
    handler_failures: u64,
    poll_failures: BTreeMap<&'static str, u64>,
}

impl StatusReporter {
    pub fn report(&mut self, status: &EngineStatus) {
        let (handler_failures, poll_failures) = self.deltas(status);
        if handler_failures > 0 {
            Metrics::handler_failures(handler_failures);
        }
        for (reason, count) in poll_failures {
            Metrics::poll_chunk_failures(reason, count);
        }
        Metrics::watched_items(status.watched_items);
        Metrics::alert_rules(status.armed_alerts, status.triggered_alerts);

        info!(
            running = status.running,
            state = %status.connection_state,
            authenticated = status.authenticated,
            reconnect_attempt = status.reconnect_attempt,
            watched_items = status.watched_items,
            armed_alerts = status.armed_alerts,
            triggered_alerts = status.triggered_alerts,
            poll_cycles = status.poll_cycles,
            handler_failures = status.handler_failures,
            "Status"
        );
    }

    /// Increase of each counter since the previous call.
    pub fn deltas(&mut self, status: &EngineStatus) -> (u64, Vec<(&'static str, u64)>) {
        let handler_failures = status
            .handler_failures
            .saturating_sub(self.handler_failures);
        self.handler_failures = status.handler_failures;

        let mut poll_failures = Vec::new();
        for (reason, total) in &status.poll_failures {
            let previous = self.poll_failures.insert(reason, *total).unwrap_or(0);
            if *total > previous {
                poll_failures.push((*reason, total - previous));
            }
        }
        (handler_failures, poll_failures)
    }
}
