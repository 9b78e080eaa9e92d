//! Price source abstraction for the polling fallback.

use crate::error::{RestError, RestResult};
use mw_core::{BoxFuture, ItemId, ItemQuote, Price};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Request/response price lookup for a batch of items in one category.
///
/// Items the upstream does not know are simply absent from the result.
pub trait PriceSource: Send + Sync {
    fn fetch_prices<'a>(
        &'a self,
        ids: &'a [ItemId],
        category: &'a str,
    ) -> BoxFuture<'a, RestResult<Vec<ItemQuote>>>;
}

/// One call recorded by `MockPriceSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub ids: Vec<ItemId>,
    pub category: String,
    pub at: tokio::time::Instant,
}

/// Scripted price source for tests.
///
/// Each call pops the next scripted outcome (`true` = succeed, `false` =
/// rate-limited); once the script is exhausted every call succeeds.
#[derive(Default)]
pub struct MockPriceSource {
    prices: Mutex<HashMap<ItemId, Price>>,
    script: Mutex<VecDeque<bool>>,
    requests: Mutex<Vec<PriceRequest>>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: impl IntoIterator<Item = bool>) -> Self {
        let source = Self::new();
        source.script.lock().extend(outcomes);
        source
    }

    /// Price returned for `id` from now on.
    pub fn set_price(&self, id: impl Into<ItemId>, price: Price) {
        self.prices.lock().insert(id.into(), price);
    }

    /// Every call so far, in order.
    pub fn requests(&self) -> Vec<PriceRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl PriceSource for MockPriceSource {
    fn fetch_prices<'a>(
        &'a self,
        ids: &'a [ItemId],
        category: &'a str,
    ) -> BoxFuture<'a, RestResult<Vec<ItemQuote>>> {
        Box::pin(async move {
            self.requests.lock().push(PriceRequest {
                ids: ids.to_vec(),
                category: category.to_string(),
                at: tokio::time::Instant::now(),
            });

            if !self.script.lock().pop_front().unwrap_or(true) {
                return Err(RestError::RateLimited {
                    retry_after_secs: Some(60),
                });
            }

            let prices = self.prices.lock();
            Ok(ids
                .iter()
                .filter_map(|id| prices.get(id).map(|p| ItemQuote::new(id.clone(), *p)))
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_known_prices_only() {
        let source = MockPriceSource::new();
        source.set_price("a", Price::from_minor_units(150));

        let ids = vec![ItemId::new("a"), ItemId::new("b")];
        let quotes = source.fetch_prices(&ids, "knives").await.unwrap();

        assert_eq!(quotes, vec![ItemQuote::new("a", Price::from_minor_units(150))]);
        assert_eq!(source.requests()[0].category, "knives");
        assert_eq!(source.requests()[0].ids, ids);
    }

    #[tokio::test]
    async fn test_mock_script_fails_in_order() {
        let source = MockPriceSource::with_script([true, false]);
        let ids = vec![ItemId::new("a")];

        assert!(source.fetch_prices(&ids, "c").await.is_ok());
        let err = source.fetch_prices(&ids, "c").await.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(source.fetch_prices(&ids, "c").await.is_ok());
        assert_eq!(source.request_count(), 3);
    }
}
