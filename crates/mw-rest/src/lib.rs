//! REST price source for the marketwatch polling fallback.
//!
//! - `PriceSource`: batch price lookup seam used by the watch engine
//! - `MarketClient`: reqwest implementation against the marketplace API
//! - `MockPriceSource`: scripted implementation for tests

pub mod client;
pub mod error;
pub mod source;

pub use client::{parse_prices_response, MarketClient, RestConfig, API_KEY_HEADER};
pub use error::{RestError, RestResult};
pub use source::{MockPriceSource, PriceRequest, PriceSource};
