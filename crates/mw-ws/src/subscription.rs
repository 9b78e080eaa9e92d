//! Subscription registry.
//!
//! Remembers every topic the caller subscribed to, together with the last
//! parameters used, so the set can be replayed after a reconnect.

use crate::message::SubscriptionParams;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// Topic -> last-used parameters. Keyed by topic: re-subscribing overwrites.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: RwLock<BTreeMap<String, SubscriptionParams>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a subscription. Returns the previous parameters, if any.
    pub fn insert(&self, topic: &str, params: SubscriptionParams) -> Option<SubscriptionParams> {
        let previous = self.topics.write().insert(topic.to_string(), params);
        if previous.is_some() {
            debug!(topic, "Subscription parameters replaced");
        }
        previous
    }

    /// Forget a subscription. Returns whether it existed.
    pub fn remove(&self, topic: &str) -> bool {
        self.topics.write().remove(topic).is_some()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.read().contains_key(topic)
    }

    pub fn params(&self, topic: &str) -> Option<SubscriptionParams> {
        self.topics.read().get(topic).cloned()
    }

    /// Copy of every subscription, ordered by topic.
    pub fn snapshot(&self) -> Vec<(String, SubscriptionParams)> {
        self.topics
            .read()
            .iter()
            .map(|(t, p)| (t.clone(), p.clone()))
            .collect()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.topics.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.read().is_empty()
    }
}
