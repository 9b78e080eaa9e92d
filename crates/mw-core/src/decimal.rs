//! Precision-safe price type.
//!
//! The upstream marketplace quotes prices as integer minor units (cents).
//! `Price` holds the major-unit value as an exact `Decimal` so that
//! threshold comparisons never suffer floating-point rounding.

use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of minor units per major unit (cents per dollar).
pub const MINOR_UNITS_SCALE: u32 = 2;

/// Price in major currency units with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Build a price from integer minor units (e.g. `1050` -> `10.50`).
    #[inline]
    pub fn from_minor_units(units: i64) -> Self {
        Self(Decimal::new(units, MINOR_UNITS_SCALE))
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_from_minor_units() {
        assert_eq!(Price::from_minor_units(1050), Price::new(dec!(10.50)));
        assert_eq!(Price::from_minor_units(1000), Price::new(dec!(10)));
        assert_eq!(Price::from_minor_units(0), Price::ZERO);
    }

    #[test]
    fn test_scale_does_not_affect_equality() {
        // 10.00 parsed from minor units must equal a configured "10"
        let from_feed = Price::from_minor_units(1000);
        let configured: Price = "10".parse().unwrap();
        assert_eq!(from_feed, configured);
        assert!(from_feed <= configured);
    }

    #[test]
    fn test_negative_detection() {
        assert!(Price::new(dec!(-0.01)).is_negative());
        assert!(!Price::ZERO.is_negative());
        assert!(!Price::new(dec!(-0)).is_negative());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("ten".parse::<Price>().is_err());
    }
}
