//! Edge-triggered threshold alerts.
//!
//! An `AlertRule` fires on the first price that satisfies its condition and
//! then stays silent until it is explicitly reset.

use crate::decimal::Price;
use crate::item::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to an alert rule at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub u64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alert#{}", self.0)
    }
}

/// Threshold direction. Both boundaries are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    /// Fires when `price <= target`.
    Below,
    /// Fires when `price >= target`.
    Above,
}

impl AlertCondition {
    #[inline]
    pub fn is_met(&self, price: Price, target: Price) -> bool {
        match self {
            Self::Below => price <= target,
            Self::Above => price >= target,
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Below => write!(f, "below"),
            Self::Above => write!(f, "above"),
        }
    }
}

/// A price alert registered for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRule {
    pub id: AlertId,
    pub item_id: ItemId,
    pub target: Price,
    pub condition: AlertCondition,
    pub triggered: bool,
    pub created_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

impl AlertRule {
    /// Create an armed rule.
    pub fn new(id: AlertId, item_id: ItemId, condition: AlertCondition, target: Price) -> Self {
        Self {
            id,
            item_id,
            target,
            condition,
            triggered: false,
            created_at: Utc::now(),
            triggered_at: None,
        }
    }

    /// Whether the rule is waiting to fire.
    #[inline]
    pub fn is_armed(&self) -> bool {
        !self.triggered
    }

    /// Evaluate `price` against an armed rule.
    ///
    /// Returns `true` exactly once per arm cycle: a triggered rule is never
    /// re-evaluated until `reset()`.
    pub fn evaluate(&mut self, price: Price, now: DateTime<Utc>) -> bool {
        if self.triggered || !self.condition.is_met(price, self.target) {
            return false;
        }
        self.triggered = true;
        self.triggered_at = Some(now);
        true
    }

    /// Re-arm the rule.
    pub fn reset(&mut self) {
        self.triggered = false;
        self.triggered_at = None;
    }
}

impl fmt::Display for AlertRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.id, self.item_id, self.condition, self.target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule(condition: AlertCondition, target: Price) -> AlertRule {
        AlertRule::new(AlertId(1), ItemId::from("X"), condition, target)
    }

    #[test]
    fn test_below_is_inclusive() {
        let target = Price::new(dec!(10));
        assert!(AlertCondition::Below.is_met(Price::new(dec!(10.00)), target));
        assert!(AlertCondition::Below.is_met(Price::new(dec!(9.99)), target));
        assert!(!AlertCondition::Below.is_met(Price::new(dec!(10.01)), target));
    }

    #[test]
    fn test_above_is_inclusive() {
        let target = Price::new(dec!(10));
        assert!(AlertCondition::Above.is_met(Price::new(dec!(10)), target));
        assert!(AlertCondition::Above.is_met(Price::new(dec!(10.01)), target));
        assert!(!AlertCondition::Above.is_met(Price::new(dec!(9.99)), target));
    }

    #[test]
    fn test_fires_once_until_reset() {
        let mut alert = rule(AlertCondition::Below, Price::new(dec!(10)));
        let now = Utc::now();

        assert!(alert.evaluate(Price::new(dec!(10)), now));
        assert!(alert.triggered);
        assert_eq!(alert.triggered_at, Some(now));

        // Lower price while triggered: silent, timestamp unchanged
        assert!(!alert.evaluate(Price::new(dec!(8)), Utc::now()));
        assert_eq!(alert.triggered_at, Some(now));

        alert.reset();
        assert!(alert.is_armed());
        assert!(alert.triggered_at.is_none());
        assert!(alert.evaluate(Price::new(dec!(9.5)), Utc::now()));
    }

    #[test]
    fn test_not_met_stays_armed() {
        let mut alert = rule(AlertCondition::Above, Price::new(dec!(50)));
        assert!(!alert.evaluate(Price::new(dec!(49.99)), Utc::now()));
        assert!(alert.is_armed());
    }

    #[test]
    fn test_condition_serde_lowercase() {
        let c: AlertCondition = serde_json::from_str("\"below\"").unwrap();
        assert_eq!(c, AlertCondition::Below);
        assert_eq!(serde_json::to_string(&AlertCondition::Above).unwrap(), "\"above\"");
    }
}
