//! Core domain types for marketwatch.
//!
//! This crate provides the types shared by the feed transport, the REST
//! fallback and the watch engine:
//! - `ItemId`, `ItemMetadata`, `ItemQuote`: marketplace item identity and quotes
//! - `Price`: exact decimal price in major currency units
//! - `AlertRule`, `AlertCondition`: edge-triggered threshold alerts
//! - `call_isolated`: panic/error isolation for user-supplied handlers

pub mod alert;
pub mod decimal;
pub mod error;
pub mod handler;
pub mod item;

pub use alert::{AlertCondition, AlertId, AlertRule};
pub use decimal::Price;
pub use error::{CoreError, HandlerError, Result};
pub use handler::{call_isolated, BoxFuture};
pub use item::{ItemId, ItemMetadata, ItemQuote, PricePoint, UpdateSource};
