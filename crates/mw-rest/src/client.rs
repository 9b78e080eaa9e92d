//! HTTP client for the marketplace price endpoint.
//!
//! `GET {base_url}/prices?category=<c>&ids=<id,id,...>` with an optional
//! `X-Api-Key` header. The response carries `{"items": [...]}` in the same
//! item format as feed frames.

use crate::error::{RestError, RestResult};
use crate::source::PriceSource;
use mw_core::{BoxFuture, ItemId, ItemQuote};
use mw_ws::CredentialProvider;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL, without the `/prices` path.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: 10_000,
        }
    }
}

/// Client for the marketplace price endpoint.
pub struct MarketClient {
    client: Client,
    prices_url: String,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl MarketClient {
    pub fn new(config: &RestConfig) -> RestResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RestError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            prices_url: format!("{}/prices", config.base_url.trim_end_matches('/')),
            credentials: None,
        })
    }

    /// Attach a credential provider. Without one, requests are anonymous.
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn prices_url(&self) -> &str {
        &self.prices_url
    }

    /// Fetch current prices for `ids` in `category`.
    pub async fn fetch_prices(
        &self,
        ids: &[ItemId],
        category: &str,
    ) -> RestResult<Vec<ItemQuote>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let id_list = ids.iter().map(ItemId::as_str).collect::<Vec<_>>().join(",");
        debug!(url = %self.prices_url, category, count = ids.len(), "Fetching prices");

        let mut request = self
            .client
            .get(&self.prices_url)
            .query(&[("category", category), ("ids", id_list.as_str())]);
        if let Some(api_key) = self.credentials.as_ref().and_then(|c| c.api_key()) {
            request = request.header(API_KEY_HEADER, api_key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| RestError::HttpClient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(RestError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RestError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parse_prices_response(&body)
    }
}

impl PriceSource for MarketClient {
    fn fetch_prices<'a>(
        &'a self,
        ids: &'a [ItemId],
        category: &'a str,
    ) -> BoxFuture<'a, RestResult<Vec<ItemQuote>>> {
        Box::pin(MarketClient::fetch_prices(self, ids, category))
    }
}

/// Parse `{"items": [...]}`, skipping malformed items.
pub fn parse_prices_response(body: &serde_json::Value) -> RestResult<Vec<ItemQuote>> {
    let items = body
        .get("items")
        .and_then(|v| v.as_array())
        .ok_or_else(|| RestError::InvalidResponse("missing items array".to_string()))?;

    let mut quotes = Vec::with_capacity(items.len());
    for item in items {
        match ItemQuote::from_json(item) {
            Ok(quote) => quotes.push(quote),
            Err(e) => warn!(error = %e, "Skipping malformed item in price response"),
        }
    }
    Ok(quotes)
}
