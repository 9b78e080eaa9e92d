//! Price watch engine.
//!
//! `PriceWatcher` keeps the watched-item set, the price cache, bounded
//! history per item and the alert registry. It consumes feed frames through
//! handlers registered on a `FeedClient` and refreshes prices with a
//! periodic poll of a `PriceSource`.
//!
//! All mutable state sits behind one mutex. The lock is released before any
//! handler runs, so handlers may call back into the engine.

use crate::alerts::AlertBook;
use crate::config::WatchConfig;
use crate::feed::quotes_from_event;
use crate::handlers::{AlertHandler, HandlerScope, PriceChange, PriceChangeHandler, WatchHandlers};
use crate::history::PriceHistory;
use crate::poller::{plan_chunks, PollSummary};
use chrono::Utc;
use mw_core::{
    AlertCondition, AlertId, AlertRule, HandlerError, ItemId, ItemMetadata, ItemQuote, Price,
    PricePoint, UpdateSource,
};
use mw_rest::PriceSource;
use mw_ws::{ConnectionState, FeedClient, FeedEvent};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub running: bool,
    pub connection_state: ConnectionState,
    pub authenticated: bool,
    pub reconnect_attempt: u32,
    pub watched_items: usize,
    pub armed_alerts: usize,
    pub triggered_alerts: usize,
    /// Change and alert handler failures since construction.
    pub handler_failures: u64,
    pub poll_cycles: u64,
    /// Failed poll chunks since construction, by failure reason.
    pub poll_failures: BTreeMap<&'static str, u64>,
}

#[derive(Debug)]
struct WatchedItem {
    price: Option<Price>,
    history: PriceHistory,
    metadata: ItemMetadata,
}

impl WatchedItem {
    fn new(capacity: usize) -> Self {
        Self {
            price: None,
            history: PriceHistory::new(capacity),
            metadata: ItemMetadata::default(),
        }
    }
}

#[derive(Debug, Default)]
struct WatchState {
    items: BTreeMap<ItemId, WatchedItem>,
    alerts: AlertBook,
}

/// Price watch and alert engine.
pub struct PriceWatcher {
    config: WatchConfig,
    client: Arc<FeedClient>,
    source: Option<Arc<dyn PriceSource>>,
    state: Mutex<WatchState>,
    handlers: WatchHandlers,
    /// Feed handlers registered (once per engine).
    wired: AtomicBool,
    running: AtomicBool,
    /// Serializes `start()` and `stop()`.
    lifecycle: tokio::sync::Mutex<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<CancellationToken>,
    handler_failures: AtomicU64,
    poll_cycles: AtomicU64,
    poll_failures: Mutex<BTreeMap<&'static str, u64>>,
}

impl PriceWatcher {
    pub fn new(config: WatchConfig, client: Arc<FeedClient>) -> Self {
        Self {
            config,
            client,
            source: None,
            state: Mutex::new(WatchState::default()),
            handlers: WatchHandlers::new(),
            wired: AtomicBool::new(false),
            running: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Vec::new()),
            shutdown: Mutex::new(CancellationToken::new()),
            handler_failures: AtomicU64::new(0),
            poll_cycles: AtomicU64::new(0),
            poll_failures: Mutex::new(BTreeMap::new()),
        }
    }

    /// Enable the polling fallback against `source`.
    pub fn with_price_source(mut self, source: Arc<dyn PriceSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<FeedClient> {
        &self.client
    }

    // ------------------------------------------------------------------------
    // Watched items
    // ------------------------------------------------------------------------

    /// Start watching an item. An initial price seeds both the cache and the
    /// history. Returns `false` (and changes nothing) if already watched.
    pub fn watch_item(&self, item_id: impl Into<ItemId>, initial_price: Option<Price>) -> bool {
        let item_id = item_id.into();
        {
            let mut state = self.state.lock();
            if state.items.contains_key(&item_id) {
                return false;
            }
            let mut item = WatchedItem::new(self.config.history_capacity);
            if let Some(price) = initial_price {
                item.price = Some(price);
                item.history.push(PricePoint::new(Utc::now(), price));
            }
            state.items.insert(item_id.clone(), item);
        }
        info!(item_id = %item_id, initial_price = ?initial_price, "Watching item");
        true
    }

    /// Stop watching an item, dropping its cached price and history.
    /// Alert rules for the item are kept.
    pub fn unwatch_item(&self, item_id: &ItemId) -> bool {
        let removed = self.state.lock().items.remove(item_id).is_some();
        if removed {
            info!(item_id = %item_id, "Unwatched item");
        }
        removed
    }

    pub fn is_watching(&self, item_id: &ItemId) -> bool {
        self.state.lock().items.contains_key(item_id)
    }

    pub fn watched_items(&self) -> Vec<ItemId> {
        self.state.lock().items.keys().cloned().collect()
    }

    /// Merge metadata into a watched item. Returns `false` if not watched.
    pub fn set_item_metadata(&self, item_id: &ItemId, metadata: &ItemMetadata) -> bool {
        match self.state.lock().items.get_mut(item_id) {
            Some(item) => {
                item.metadata.merge(metadata);
                true
            }
            None => false,
        }
    }

    pub fn get_current_price(&self, item_id: &ItemId) -> Option<Price> {
        self.state.lock().items.get(item_id).and_then(|i| i.price)
    }

    /// The `limit` most recent points (all when `None`), oldest first.
    pub fn get_price_history(&self, item_id: &ItemId, limit: Option<usize>) -> Vec<PricePoint> {
        self.state
            .lock()
            .items
            .get(item_id)
            .map(|i| i.history.recent(limit))
            .unwrap_or_default()
    }

    pub fn get_item_metadata(&self, item_id: &ItemId) -> Option<ItemMetadata> {
        self.state.lock().items.get(item_id).map(|i| i.metadata.clone())
    }

    // ------------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------------

    /// Register an armed alert, watching the item if it is not yet watched.
    pub fn add_price_alert(
        &self,
        item_id: impl Into<ItemId>,
        condition: AlertCondition,
        target: Price,
    ) -> AlertId {
        let item_id = item_id.into();
        self.watch_item(item_id.clone(), None);
        let id = self
            .state
            .lock()
            .alerts
            .add(item_id.clone(), condition, target);
        info!(alert = %id, item_id = %item_id, %condition, %target, "Price alert added");
        id
    }

    pub fn remove_price_alert(&self, id: AlertId) -> Option<AlertRule> {
        let removed = self.state.lock().alerts.remove(id);
        if removed.is_some() {
            info!(alert = %id, "Price alert removed");
        }
        removed
    }

    /// Re-arm a triggered alert. Returns `false` if the id is unknown.
    pub fn reset_alert(&self, id: AlertId) -> bool {
        let found = self.state.lock().alerts.reset(id);
        if found {
            debug!(alert = %id, "Price alert re-armed");
        }
        found
    }

    pub fn alert(&self, id: AlertId) -> Option<AlertRule> {
        self.state.lock().alerts.get(id).cloned()
    }

    pub fn alerts_for_item(&self, item_id: &ItemId) -> Vec<AlertRule> {
        self.state.lock().alerts.for_item(item_id)
    }

    // ------------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------------

    pub fn register_price_change_handler(
        &self,
        handler: Arc<dyn PriceChangeHandler>,
        scope: HandlerScope,
    ) {
        self.handlers.register_change(handler, scope);
    }

    pub fn register_alert_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.handlers.register_alert(handler);
    }

    // ------------------------------------------------------------------------
    // Price updates
    // ------------------------------------------------------------------------

    /// Apply a price from outside the feed and poll paths.
    ///
    /// Returns `true` if the cached price changed.
    pub fn on_price_update(&self, item_id: &ItemId, price: Price) -> bool {
        self.apply_update(item_id, price, None, UpdateSource::Manual)
    }

    /// Apply a quote, merging its metadata. Returns `true` if the cached price changed.
    pub fn apply_quote(&self, quote: &ItemQuote, source: UpdateSource) -> bool {
        let metadata = (!quote.metadata.is_empty()).then_some(&quote.metadata);
        self.apply_update(&quote.id, quote.price, metadata, source)
    }

    /// Feed handler body for market and item update frames.
    pub fn handle_feed_event(&self, event: &FeedEvent) {
        let mut changed = 0usize;
        let quotes = quotes_from_event(event);
        for quote in &quotes {
            if self.apply_quote(quote, UpdateSource::Feed) {
                changed += 1;
            }
        }
        debug!(
            event_type = %event.event_type,
            quotes = quotes.len(),
            changed,
            "Feed frame applied"
        );
    }

    fn apply_update(
        &self,
        item_id: &ItemId,
        price: Price,
        metadata: Option<&ItemMetadata>,
        source: UpdateSource,
    ) -> bool {
        let now = Utc::now();
        // Cache write and alert evaluation share one critical section
        let (change, fired) = {
            let mut state = self.state.lock();
            let Some(item) = state.items.get_mut(item_id) else {
                return false;
            };
            if let Some(metadata) = metadata {
                item.metadata.merge(metadata);
            }
            if item.price == Some(price) {
                return false;
            }
            item.history.push(PricePoint::new(now, price));
            let old_price = item.price.replace(price);
            let fired = state.alerts.evaluate(item_id, price, now);
            let change = PriceChange {
                item_id: item_id.clone(),
                old_price,
                new_price: price,
                timestamp: now,
                source,
            };
            (change, fired)
        };

        debug!(
            item_id = %item_id,
            old = ?change.old_price.map(|p| p.to_string()),
            new = %price,
            source = %source,
            "Price changed"
        );
        let mut failed = self.handlers.dispatch_change(&change);

        for rule in &fired {
            info!(
                alert = %rule.id,
                item_id = %item_id,
                condition = %rule.condition,
                target = %rule.target,
                %price,
                "Price alert triggered"
            );
            failed += self.handlers.dispatch_alert(rule, price);
        }

        if failed > 0 {
            self.handler_failures
                .fetch_add(failed as u64, Ordering::Relaxed);
        }
        true
    }

    // ------------------------------------------------------------------------
    // Polling fallback
    // ------------------------------------------------------------------------

    /// Run one poll cycle now. Without a price source this does nothing.
    pub async fn poll_once(&self) -> PollSummary {
        let token = self.shutdown.lock().clone();
        self.run_poll_cycle(&token).await
    }

    async fn run_poll_cycle(&self, token: &CancellationToken) -> PollSummary {
        let Some(source) = self.source.clone() else {
            return PollSummary::default();
        };

        let targets: Vec<(ItemId, Option<String>)> = self
            .state
            .lock()
            .items
            .iter()
            .map(|(id, item)| (id.clone(), item.metadata.category.clone()))
            .collect();
        let chunks = plan_chunks(
            &targets,
            &self.config.default_category,
            self.config.poll_chunk_size,
        );

        let mut summary = PollSummary {
            chunks: chunks.len(),
            ..Default::default()
        };
        let delay = Duration::from_millis(self.config.poll_chunk_delay_ms);

        for (index, chunk) in chunks.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = token.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                }
            }

            match source.fetch_prices(&chunk.ids, &chunk.category).await {
                Ok(quotes) => {
                    summary.succeeded += 1;
                    for quote in &quotes {
                        self.apply_quote(quote, UpdateSource::Poll);
                    }
                    summary.quotes += quotes.len();
                }
                Err(e) => {
                    summary.failed += 1;
                    *self.poll_failures.lock().entry(e.reason()).or_default() += 1;
                    warn!(
                        category = %chunk.category,
                        chunk = index,
                        items = chunk.ids.len(),
                        error = %e,
                        "Poll chunk failed, skipping"
                    );
                }
            }
        }

        self.poll_cycles.fetch_add(1, Ordering::Relaxed);
        summary
    }

    async fn poll_loop(&self, token: CancellationToken) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        info!(interval_secs = interval.as_secs(), "Poll loop started");

        while !token.is_cancelled() {
            let summary = self.run_poll_cycle(&token).await;
            debug!(
                chunks = summary.chunks,
                succeeded = summary.succeeded,
                failed = summary.failed,
                quotes = summary.quotes,
                "Poll cycle finished"
            );

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = token.cancelled() => break,
            }
        }

        info!("Poll loop stopped");
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Connect the feed and start the listener and poll loops.
    ///
    /// Returns `false` if the feed cannot be connected. Calling it while
    /// running is a no-op returning `true`.
    pub async fn start(self: &Arc<Self>) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_running() {
            debug!("Price watcher already running");
            return true;
        }

        self.wire_feed_handlers();

        if !self.client.connect().await {
            warn!("Price watcher not started: feed connection failed");
            return false;
        }

        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();
        self.running.store(true, Ordering::SeqCst);

        let mut tasks = vec![self.spawn_listener()];
        if self.source.is_some() && self.config.poll_interval_secs > 0 {
            let watcher = Arc::clone(self);
            tasks.push(tokio::spawn(async move { watcher.poll_loop(token).await }));
        } else {
            debug!("Polling fallback disabled");
        }
        *self.tasks.lock() = tasks;

        info!(watched_items = self.watched_items().len(), "Price watcher started");
        true
    }

    /// Stop both loops and close the feed. No-op when not running.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("Price watcher not running");
            return;
        }

        self.shutdown.lock().cancel();
        self.client.signal_shutdown();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.stop_timeout_ms);
        for task in tasks {
            let abort = task.abort_handle();
            match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Watcher task ended abnormally"),
                Err(_) => {
                    warn!("Watcher task did not stop in time, aborting");
                    abort.abort();
                }
            }
        }

        self.client.close().await;
        info!("Price watcher stopped");
    }

    /// Reconnect the feed after it gave up, restarting the listener.
    ///
    /// Returns `false` when the watcher is not running or reconnection fails.
    pub async fn reconnect_feed(self: &Arc<Self>) -> bool {
        if !self.is_running() {
            warn!("Price watcher not running, use start()");
            return false;
        }

        info!(state = %self.client.state(), "Reconnecting feed on request");
        if !self.client.connect_with_retry().await {
            return false;
        }

        if self.is_running() && !self.client.is_running() {
            let listener = self.spawn_listener();
            self.tasks.lock().push(listener);
        }
        true
    }

    fn spawn_listener(&self) -> JoinHandle<()> {
        let client = Arc::clone(&self.client);
        tokio::spawn(async move { client.listen().await })
    }

    /// Register the engine on the feed for both update event types.
    ///
    /// Handlers hold a weak reference so the client does not keep the
    /// engine alive.
    fn wire_feed_handlers(self: &Arc<Self>) {
        if self.wired.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut seen = HashSet::new();
        for event_type in [
            &self.config.market_update_event,
            &self.config.item_update_event,
        ] {
            if !seen.insert(event_type.as_str()) {
                continue;
            }
            let watcher = Arc::downgrade(self);
            self.client.register_handler(
                event_type,
                Arc::new(move |event: &FeedEvent| -> Result<(), HandlerError> {
                    if let Some(watcher) = watcher.upgrade() {
                        watcher.handle_feed_event(event);
                    }
                    Ok(())
                }),
            );
        }
    }

    pub fn status(&self) -> EngineStatus {
        let (watched_items, armed_alerts, triggered_alerts) = {
            let state = self.state.lock();
            let (armed, triggered) = state.alerts.counts();
            (state.items.len(), armed, triggered)
        };

        EngineStatus {
            running: self.is_running(),
            connection_state: self.client.state(),
            authenticated: self.client.is_authenticated(),
            reconnect_attempt: self.client.reconnect_attempt(),
            watched_items,
            armed_alerts,
            triggered_alerts,
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.lock().clone(),
        }
    }
}
