//! Alert rule registry.

use chrono::{DateTime, Utc};
use mw_core::{AlertCondition, AlertId, AlertRule, ItemId, Price};
use std::collections::BTreeMap;

/// All alert rules, keyed by id in registration order.
///
/// Rules are never removed implicitly: unwatching an item keeps its rules.
#[derive(Debug, Default)]
pub struct AlertBook {
    rules: BTreeMap<AlertId, AlertRule>,
    next_id: u64,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an armed rule. Identical rules are allowed.
    pub fn add(&mut self, item_id: ItemId, condition: AlertCondition, target: Price) -> AlertId {
        self.next_id += 1;
        let id = AlertId(self.next_id);
        self.rules
            .insert(id, AlertRule::new(id, item_id, condition, target));
        id
    }

    pub fn remove(&mut self, id: AlertId) -> Option<AlertRule> {
        self.rules.remove(&id)
    }

    /// Re-arm a rule. Returns `false` if the id is unknown.
    pub fn reset(&mut self, id: AlertId) -> bool {
        match self.rules.get_mut(&id) {
            Some(rule) => {
                rule.reset();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertRule> {
        self.rules.get(&id)
    }

    pub fn for_item(&self, item_id: &ItemId) -> Vec<AlertRule> {
        self.rules
            .values()
            .filter(|r| &r.item_id == item_id)
            .cloned()
            .collect()
    }

    /// Evaluate every armed rule of `item_id` against `price`.
    ///
    /// Returns the rules that fired, already marked triggered.
    pub fn evaluate(
        &mut self,
        item_id: &ItemId,
        price: Price,
        now: DateTime<Utc>,
    ) -> Vec<AlertRule> {
        self.rules
            .values_mut()
            .filter(|r| &r.item_id == item_id)
            .filter_map(|r| r.evaluate(price, now).then(|| r.clone()))
            .collect()
    }

    /// (armed, triggered) rule counts.
    pub fn counts(&self) -> (usize, usize) {
        let triggered = self.rules.values().filter(|r| r.triggered).count();
        (self.rules.len() - triggered, triggered)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
