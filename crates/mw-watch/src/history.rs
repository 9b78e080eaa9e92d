//! Bounded per-item price history.

use mw_core::PricePoint;
use std::collections::VecDeque;

/// Ring buffer of the most recent price points, oldest first.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceHistory {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting and returning the oldest one when full.
    pub fn push(&mut self, point: PricePoint) -> Option<PricePoint> {
        let evicted = if self.points.len() == self.capacity {
            self.points.pop_front()
        } else {
            None
        };
        self.points.push_back(point);
        evicted
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The `limit` most recent points (all when `None`), oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<PricePoint> {
        let skip = limit.map_or(0, |n| self.points.len().saturating_sub(n));
        self.points.iter().skip(skip).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use mw_core::Price;

    fn point(i: i64) -> PricePoint {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        PricePoint::new(t0 + Duration::seconds(i), Price::from_minor_units(i))
    }

    #[test]
    fn test_push_within_capacity() {
        let mut history = PriceHistory::new(3);
        assert!(history.push(point(1)).is_none());
        assert!(history.push(point(2)).is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(history.recent(Some(1)), vec![point(2)]);
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let mut history = PriceHistory::new(100);
        for i in 0..150 {
            history.push(point(i));
        }
        assert_eq!(history.len(), 100);
        let points = history.recent(None);
        assert_eq!(points.first(), Some(&point(50)));
        assert_eq!(points.last(), Some(&point(149)));
        assert!(points.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_push_returns_evicted() {
        let mut history = PriceHistory::new(2);
        history.push(point(1));
        history.push(point(2));
        assert_eq!(history.push(point(3)), Some(point(1)));
    }

    #[test]
    fn test_recent_limit() {
        let mut history = PriceHistory::new(10);
        for i in 0..5 {
            history.push(point(i));
        }
        assert_eq!(history.recent(Some(2)), vec![point(3), point(4)]);
        assert_eq!(history.recent(Some(50)).len(), 5);
        assert!(history.recent(Some(0)).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_one() {
        let mut history = PriceHistory::new(0);
        history.push(point(1));
        history.push(point(2));
        assert_eq!(history.recent(None), vec![point(2)]);
    }
}
