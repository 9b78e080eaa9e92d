//! Observer traits and registries for price-change and alert events.

use chrono::{DateTime, Utc};
use mw_core::{call_isolated, AlertRule, HandlerError, ItemId, Price, UpdateSource};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A cached price moved to a different value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceChange {
    pub item_id: ItemId,
    /// `None` for the first observed price.
    pub old_price: Option<Price>,
    pub new_price: Price,
    pub timestamp: DateTime<Utc>,
    pub source: UpdateSource,
}

pub trait PriceChangeHandler: Send + Sync {
    fn on_price_change(&self, change: &PriceChange) -> Result<(), HandlerError>;
}

impl<F> PriceChangeHandler for F
where
    F: Fn(&PriceChange) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_price_change(&self, change: &PriceChange) -> Result<(), HandlerError> {
        self(change)
    }
}

pub trait AlertHandler: Send + Sync {
    /// Called once per firing with the rule (already triggered) and the price that fired it.
    fn on_alert(&self, rule: &AlertRule, price: Price) -> Result<(), HandlerError>;
}

impl<F> AlertHandler for F
where
    F: Fn(&AlertRule, Price) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_alert(&self, rule: &AlertRule, price: Price) -> Result<(), HandlerError> {
        self(rule, price)
    }
}

/// Which items a change handler observes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandlerScope {
    AllItems,
    Item(ItemId),
}

/// Change and alert handler lists.
///
/// Append-only, no de-duplication. Dispatch works on a snapshot so handlers
/// may register more handlers or call back into the engine.
#[derive(Default)]
pub struct WatchHandlers {
    by_item: RwLock<HashMap<ItemId, Vec<Arc<dyn PriceChangeHandler>>>>,
    all_items: RwLock<Vec<Arc<dyn PriceChangeHandler>>>,
    alerts: RwLock<Vec<Arc<dyn AlertHandler>>>,
}

impl WatchHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_change(&self, handler: Arc<dyn PriceChangeHandler>, scope: HandlerScope) {
        match scope {
            HandlerScope::AllItems => self.all_items.write().push(handler),
            HandlerScope::Item(id) => self.by_item.write().entry(id).or_default().push(handler),
        }
    }

    pub fn register_alert(&self, handler: Arc<dyn AlertHandler>) {
        self.alerts.write().push(handler);
    }

    /// Item-scoped handlers first, then all-items handlers.
    ///
    /// Returns the number of failed handlers.
    pub fn dispatch_change(&self, change: &PriceChange) -> usize {
        let mut handlers: Vec<Arc<dyn PriceChangeHandler>> = self
            .by_item
            .read()
            .get(&change.item_id)
            .cloned()
            .unwrap_or_default();
        handlers.extend(self.all_items.read().iter().cloned());

        let mut failed = 0;
        for handler in &handlers {
            if let Err(e) = call_isolated(|| handler.on_price_change(change)) {
                failed += 1;
                warn!(item_id = %change.item_id, error = %e, "Price change handler failed");
            }
        }
        failed
    }

    /// Returns the number of failed handlers.
    pub fn dispatch_alert(&self, rule: &AlertRule, price: Price) -> usize {
        let handlers: Vec<Arc<dyn AlertHandler>> = self.alerts.read().clone();

        let mut failed = 0;
        for handler in &handlers {
            if let Err(e) = call_isolated(|| handler.on_alert(rule, price)) {
                failed += 1;
                warn!(
                    alert = %rule.id,
                    item_id = %rule.item_id,
                    error = %e,
                    "Alert handler failed"
                );
            }
        }
        failed
    }
}
