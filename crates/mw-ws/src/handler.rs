//! Per-event-type handler registry.

use crate::message::FeedEvent;
use mw_core::{call_isolated, HandlerError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Observer for application-level feed frames.
pub trait FeedHandler: Send + Sync {
    fn handle(&self, event: &FeedEvent) -> Result<(), HandlerError>;
}

impl<F> FeedHandler for F
where
    F: Fn(&FeedEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &FeedEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Outcome of dispatching one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers invoked.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Event type -> ordered handler list.
///
/// Registration is append-only and does not de-duplicate: registering the
/// same handler twice means it runs twice per frame.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn FeedHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, event_type: &str, handler: Arc<dyn FeedHandler>) {
        self.handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }

    /// Invoke every handler registered for `event.event_type`, in
    /// registration order. Each call is isolated from the others.
    pub fn dispatch(&self, event: &FeedEvent) -> DispatchOutcome {
        // Snapshot so handlers may register further handlers
        let handlers: Vec<Arc<dyn FeedHandler>> = self
            .handlers
            .read()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        let mut outcome = DispatchOutcome::default();
        for (index, handler) in handlers.iter().enumerate() {
            outcome.invoked += 1;
            if let Err(e) = call_isolated(|| handler.handle(event)) {
                outcome.failed += 1;
                warn!(
                    event_type = %event.event_type,
                    handler_index = index,
                    error = %e,
                    "Feed handler failed"
                );
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn FeedHandler> {
        Arc::new(move |_: &FeedEvent| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_only_matching_type() {
        let registry = HandlerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register("item_update", counting_handler(counter.clone()));

        let outcome = registry.dispatch(&FeedEvent::new("market_update", serde_json::Value::Null));
        assert_eq!(outcome.invoked, 0);

        let outcome = registry.dispatch(&FeedEvent::new("item_update", serde_json::Value::Null));
        assert_eq!(outcome.invoked, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_double_registration_runs_twice() {
        let registry = HandlerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(counter.clone());
        registry.register("item_update", handler.clone());
        registry.register("item_update", handler);

        registry.dispatch(&FeedEvent::new("item_update", serde_json::Value::Null));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(registry.handler_count("item_update"), 2);
    }

    #[test]
    fn test_failing_handlers_do_not_block_siblings() {
        let registry = HandlerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.register(
            "item_update",
            Arc::new(|_: &FeedEvent| -> Result<(), HandlerError> {
                Err(HandlerError::failed("nope"))
            }),
        );
        registry.register(
            "item_update",
            Arc::new(|_: &FeedEvent| -> Result<(), HandlerError> { panic!("boom") }),
        );
        registry.register("item_update", counting_handler(counter.clone()));

        let outcome = registry.dispatch(&FeedEvent::new("item_update", serde_json::Value::Null));
        assert_eq!(outcome, DispatchOutcome { invoked: 3, failed: 2 });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
