//! Price watch and alert engine.
//!
//! Consumes the realtime feed and a polling fallback, maintains a price
//! cache with bounded history per watched item, and evaluates
//! edge-triggered threshold alerts.

pub mod alerts;
pub mod config;
pub mod engine;
pub mod feed;
pub mod handlers;
pub mod history;
pub mod poller;

pub use alerts::AlertBook;
pub use config::WatchConfig;
pub use engine::{EngineStatus, PriceWatcher};
pub use feed::quotes_from_event;
pub use handlers::{AlertHandler, HandlerScope, PriceChange, PriceChangeHandler, WatchHandlers};
pub use history::PriceHistory;
pub use poller::{plan_chunks, PollChunk, PollSummary};
