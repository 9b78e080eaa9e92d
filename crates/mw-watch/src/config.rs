//! Watch engine configuration.

use serde::{Deserialize, Serialize};

/// Watch engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Price points kept per item.
    pub history_capacity: usize,
    /// Seconds between poll cycles (0 disables polling).
    pub poll_interval_secs: u64,
    /// Items per poll request.
    pub poll_chunk_size: usize,
    /// Pause between poll requests within a cycle.
    pub poll_chunk_delay_ms: u64,
    /// Bound on waiting for the background tasks in `stop()`.
    pub stop_timeout_ms: u64,
    /// Feed event type carrying market-wide updates.
    pub market_update_event: String,
    /// Feed event type carrying single-item updates.
    pub item_update_event: String,
    /// Poll bucket for items without a known category.
    pub default_category: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            poll_interval_secs: 300,
            poll_chunk_size: 50,
            poll_chunk_delay_ms: 1_000,
            stop_timeout_ms: 5_000,
            market_update_event: "market_update".to_string(),
            item_update_event: "item_update".to_string(),
            default_category: "default".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.poll_interval_secs, 300);
        assert_eq!(config.poll_chunk_size, 50);
        assert_eq!(config.poll_chunk_delay_ms, 1_000);
        assert_eq!(config.stop_timeout_ms, 5_000);
    }
}
