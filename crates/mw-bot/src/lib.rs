//! Marketplace price watcher application.
//!
//! Wires the feed client, the REST fallback and the watch engine together
//! from a TOML configuration, records metrics and logs alerts.

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
