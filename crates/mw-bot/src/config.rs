//! Application configuration.

use crate::error::{AppError, AppResult};
use mw_core::{AlertCondition, Price};
use mw_rest::RestConfig;
use mw_watch::WatchConfig;
use mw_ws::{FeedConfig, SubscriptionParams};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Feed connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// WebSocket URL of the realtime feed.
    pub url: String,
    /// Consecutive failed reconnects before giving up (0 = never). Default: 10.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Backoff cap in seconds. Default: 60.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Default: 30,000.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Idle time before a ping (0 disables). Default: 45,000.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Default: 10,000.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_heartbeat_interval_ms() -> u64 {
    45_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    10_000
}

impl From<FeedSettings> for FeedConfig {
    fn from(settings: FeedSettings) -> Self {
        Self {
            url: settings.url,
            max_reconnect_attempts: settings.max_reconnect_attempts,
            max_backoff_secs: settings.max_backoff_secs,
            handshake_timeout_ms: settings.handshake_timeout_ms,
            heartbeat_interval_ms: settings.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.heartbeat_timeout_ms,
        }
    }
}

/// REST fallback settings. Polling is disabled without a section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSettings {
    /// Base URL of the marketplace API.
    pub base_url: String,
    /// Per-request timeout. Default: 10,000.
    #[serde(default = "default_rest_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rest_timeout_ms() -> u64 {
    10_000
}

impl From<&RestSettings> for RestConfig {
    fn from(settings: &RestSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            timeout_ms: settings.timeout_ms,
        }
    }
}

/// Topic subscribed after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub topic: String,
    #[serde(default)]
    pub params: SubscriptionParams,
}

/// Alert registered for an item at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub condition: AlertCondition,
    /// Threshold in major units, e.g. `"10.50"`.
    pub target: Price,
}

/// Item watched from startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemConfig {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Poll bucket; items without one use the default category.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub initial_price: Option<Price>,
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub feed: FeedSettings,
    #[serde(default)]
    pub rest: Option<RestSettings>,
    #[serde(default)]
    pub watch: WatchConfig,
    /// Environment variable holding the API key. Default: `MW_API_KEY`.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Seconds between status log lines. Default: 60.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
    #[serde(default)]
    pub items: Vec<ItemConfig>,
}

fn default_api_key_env() -> String {
    "MW_API_KEY".to_string()
}

fn default_status_interval_secs() -> u64 {
    60
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the engine misbehave silently.
    pub fn validate(&self) -> AppResult<()> {
        if self.feed.url.trim().is_empty() {
            return Err(AppError::Config("feed.url must not be empty".to_string()));
        }
        if self.watch.history_capacity == 0 {
            return Err(AppError::Config(
                "watch.history_capacity must be positive".to_string(),
            ));
        }
        if self.watch.poll_chunk_size == 0 {
            return Err(AppError::Config(
                "watch.poll_chunk_size must be positive".to_string(),
            ));
        }
        if self.status_interval_secs == 0 {
            return Err(AppError::Config(
                "status_interval_secs must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for item in &self.items {
            if item.id.trim().is_empty() {
                return Err(AppError::Config("item id must not be empty".to_string()));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(AppError::Config(format!("duplicate item id: {}", item.id)));
            }
            if item.alerts.iter().any(|a| a.target.is_negative()) {
                return Err(AppError::Config(format!(
                    "negative alert target for item {}",
                    item.id
                )));
            }
        }
        Ok(())
    }

    /// Total alert rules declared across items.
    pub fn alert_count(&self) -> usize {
        self.items.iter().map(|i| i.alerts.len()).sum()
    }
}
