//! Extraction of item quotes from feed frames.

use mw_core::ItemQuote;
use mw_ws::FeedEvent;
use tracing::warn;

/// Quotes carried in `data.items`, skipping malformed items individually.
pub fn quotes_from_event(event: &FeedEvent) -> Vec<ItemQuote> {
    event
        .items()
        .iter()
        .filter_map(|item| match ItemQuote::from_json(item) {
            Ok(quote) => Some(quote),
            Err(e) => {
                warn!(event_type = %event.event_type, error = %e, "Skipping malformed feed item");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mw_core::{ItemId, Price};
    use serde_json::json;

    #[test]
    fn test_valid_items_survive_malformed_neighbours() {
        let event = FeedEvent::new(
            "market_update",
            json!({"items": [
                {"id": "a", "price": 1000, "category": "knives"},
                {"id": "b", "price": "oops"},
                {"id": 7, "price": 250},
                "garbage",
            ]}),
        );

        let quotes = quotes_from_event(&event);
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].id, ItemId::new("a"));
        assert_eq!(quotes[0].metadata.category.as_deref(), Some("knives"));
        assert_eq!(quotes[1].id, ItemId::new("7"));
        assert_eq!(quotes[1].price, Price::from_minor_units(250));
    }

    #[test]
    fn test_frame_without_items() {
        let event = FeedEvent::new("item_update", json!({"other": 1}));
        assert!(quotes_from_event(&event).is_empty());
    }
}
