//! Marketplace item identity, metadata and quotes.

use crate::decimal::Price;
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque upstream item identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id that upstream may encode either as a string or a number.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Optional descriptive data, filled in opportunistically from feed frames
/// and poll responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Display title.
    pub title: Option<String>,
    /// Marketplace category, used to batch poll requests.
    pub category: Option<String>,
}

impl ItemMetadata {
    /// Overwrite fields that `other` carries; keep the rest.
    pub fn merge(&mut self, other: &ItemMetadata) {
        if let Some(title) = &other.title {
            self.title = Some(title.clone());
        }
        if let Some(category) = &other.category {
            self.category = Some(category.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.category.is_none()
    }
}

/// A single price observation for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemQuote {
    pub id: ItemId,
    pub price: Price,
    pub metadata: ItemMetadata,
}

impl ItemQuote {
    pub fn new(id: impl Into<ItemId>, price: Price) -> Self {
        Self {
            id: id.into(),
            price,
            metadata: ItemMetadata::default(),
        }
    }

    /// Parse one element of an upstream `items` array.
    ///
    /// Format: `{"id": "123" | 123, "price": 1050, "title"?: "...", "category"?: "..."}`
    /// where `price` is in integer minor units. Numeric strings are accepted
    /// for `price` as well.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, CoreError> {
        let id = value
            .get("id")
            .and_then(ItemId::from_json)
            .ok_or_else(|| CoreError::InvalidItemId(value.to_string()))?;

        let minor_units = match value.get("price") {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .ok_or_else(|| CoreError::InvalidPrice(format!("item {id}: {value}")))?;

        if minor_units < 0 {
            return Err(CoreError::InvalidPrice(format!(
                "item {id}: negative price {minor_units}"
            )));
        }

        let text = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Ok(Self {
            id,
            price: Price::from_minor_units(minor_units),
            metadata: ItemMetadata {
                title: text("title"),
                category: text("category"),
            },
        })
    }
}

/// One entry of an item's bounded price history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Price,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Price) -> Self {
        Self { timestamp, price }
    }
}

/// Where a price update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateSource {
    /// Push update from the realtime feed.
    Feed,
    /// Request/response refresh from the polling loop.
    Poll,
    /// Direct call from the embedding application.
    Manual,
}

impl UpdateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Feed => "feed",
            Self::Poll => "poll",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
