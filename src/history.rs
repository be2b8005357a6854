//! Per-ticker rolling price history
//!
//! Maintains two bounded ring buffers per ticker: a short-window buffer
//! for on-demand history queries and a minute-resolution buffer for the
//! 1-minute-lookback alert comparison. Points are immutable once appended;
//! the oldest entry is evicted when a buffer reaches capacity.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors raised by history queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("unknown ticker: {0}")]
    UnknownTicker(String),
}

/// One timestamped price observation.
///
/// `change_percent` is relative to the immediately preceding generated
/// point and is computed at append time, so it stays correct even after
/// the predecessor has been evicted from the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix nanoseconds.
    pub timestamp: i64,
    pub price: Decimal,
    pub change_percent: Decimal,
}

/// Dual ring buffers for a single ticker.
#[derive(Debug)]
pub struct TickerHistory {
    /// Short-window buffer for history queries (newest at the back).
    recent: VecDeque<PricePoint>,
    /// Minute-lookback buffer for alerting (newest at the back).
    minute: VecDeque<PricePoint>,
    recent_capacity: usize,
    minute_capacity: usize,
}

impl TickerHistory {
    pub fn new(recent_capacity: usize, minute_capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(recent_capacity),
            minute: VecDeque::with_capacity(minute_capacity),
            recent_capacity,
            minute_capacity,
        }
    }

    /// Append a point to both buffers, evicting the oldest at capacity.
    pub fn append(&mut self, point: PricePoint) {
        if self.recent.len() >= self.recent_capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(point.clone());

        if self.minute.len() >= self.minute_capacity {
            self.minute.pop_front();
        }
        self.minute.push_back(point);
    }

    /// Most recent point whose timestamp is at or before `now - duration`.
    ///
    /// Scans the minute buffer newest-to-oldest and stops at the first
    /// match. Returns `None` when the buffer spans less than the requested
    /// duration. The linear reverse scan is deliberate: the buffer is
    /// bounded at tens of points, so an index structure is not worth it.
    pub fn lookback(&self, duration_nanos: i64, now: i64) -> Option<&PricePoint> {
        let cutoff = now - duration_nanos;
        self.minute.iter().rev().find(|point| point.timestamp <= cutoff)
    }

    /// Up to `count` most recent points in chronological order.
    pub fn recent_points(&self, count: usize) -> Vec<PricePoint> {
        let skip = self.recent.len().saturating_sub(count);
        self.recent.iter().skip(skip).cloned().collect()
    }

    /// Prices from the short-window buffer with `timestamp >= cutoff`.
    pub fn prices_since(&self, cutoff: i64) -> Vec<Decimal> {
        self.recent
            .iter()
            .filter(|point| point.timestamp >= cutoff)
            .map(|point| point.price)
            .collect()
    }

    /// Drop short-window entries older than `cutoff`. Returns the number
    /// removed. Advisory housekeeping; the ring capacity already bounds
    /// memory.
    pub fn prune_older_than(&mut self, cutoff: i64) -> usize {
        let mut removed = 0;
        while self
            .recent
            .front()
            .is_some_and(|point| point.timestamp < cutoff)
        {
            self.recent.pop_front();
            removed += 1;
        }
        removed
    }

    /// Number of points in the short-window buffer.
    pub fn recent_len(&self) -> usize {
        self.recent.len()
    }

    /// Number of points in the minute buffer.
    pub fn minute_len(&self) -> usize {
        self.minute.len()
    }

    /// Most recently appended point, if any.
    pub fn latest(&self) -> Option<&PricePoint> {
        self.recent.back()
    }
}

/// History buffers for the full ticker set.
#[derive(Debug)]
pub struct HistoryStore {
    tickers: BTreeMap<String, TickerHistory>,
    recent_capacity: usize,
    minute_capacity: usize,
}

impl HistoryStore {
    pub fn new(recent_capacity: usize, minute_capacity: usize) -> Self {
        Self {
            tickers: BTreeMap::new(),
            recent_capacity,
            minute_capacity,
        }
    }

    /// Append a point for a ticker, creating its buffers on first use.
    pub fn append(&mut self, ticker: &str, point: PricePoint) {
        self.tickers
            .entry(ticker.to_string())
            .or_insert_with(|| {
                TickerHistory::new(self.recent_capacity, self.minute_capacity)
            })
            .append(point);
    }

    /// Minute-buffer lookback for a ticker. `None` covers both an unknown
    /// ticker and insufficient buffered data; callers that must
    /// distinguish go through [`HistoryStore::recent`].
    pub fn lookback(
        &self,
        ticker: &str,
        duration_nanos: i64,
        now: i64,
    ) -> Option<&PricePoint> {
        self.tickers
            .get(ticker)?
            .lookback(duration_nanos, now)
    }

    /// Up to `count` most recent points for a ticker, chronological.
    pub fn recent(
        &self,
        ticker: &str,
        count: usize,
    ) -> Result<Vec<PricePoint>, HistoryError> {
        self.tickers
            .get(ticker)
            .map(|history| history.recent_points(count))
            .ok_or_else(|| HistoryError::UnknownTicker(ticker.to_string()))
    }

    /// Retention sweep across all tickers. Returns total entries removed.
    pub fn prune_older_than(&mut self, cutoff: i64) -> usize {
        self.tickers
            .values_mut()
            .map(|history| history.prune_older_than(cutoff))
            .sum()
    }

    /// Iterate (ticker, history) in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TickerHistory)> {
        self.tickers.iter()
    }

    /// Per-ticker history, if the ticker has any points.
    pub fn get(&self, ticker: &str) -> Option<&TickerHistory> {
        self.tickers.get(ticker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECOND: i64 = 1_000_000_000;

    fn point(ts_secs: i64, price: i64) -> PricePoint {
        PricePoint {
            timestamp: ts_secs * SECOND,
            price: Decimal::new(price, 2),
            change_percent: Decimal::ZERO,
        }
    }

    #[test]
    fn test_append_and_latest() {
        let mut history = TickerHistory::new(100, 60);
        history.append(point(0, 10000));
        history.append(point(2, 10100));

        assert_eq!(history.recent_len(), 2);
        assert_eq!(history.minute_len(), 2);
        assert_eq!(history.latest().unwrap().price, Decimal::new(10100, 2));
    }

    #[test]
    fn test_fifo_eviction() {
        let mut history = TickerHistory::new(3, 2);
        for i in 0..5 {
            history.append(point(i, 10000 + i));
        }

        assert_eq!(history.recent_len(), 3);
        assert_eq!(history.minute_len(), 2);
        // Oldest survivor in the short buffer is the third append
        let points = history.recent_points(10);
        assert_eq!(points[0].timestamp, 2 * SECOND);
    }

    #[test]
    fn test_lookback_insufficient_data() {
        let mut history = TickerHistory::new(100, 60);
        // Buffer spans only 30 seconds
        history.append(point(100, 10000));
        history.append(point(130, 10100));

        assert!(history.lookback(60 * SECOND, 130 * SECOND).is_none());
    }

    #[test]
    fn test_lookback_returns_newest_qualifying() {
        let mut history = TickerHistory::new(100, 60);
        history.append(point(0, 10000));
        history.append(point(30, 10300));
        history.append(point(61, 10350));

        // At t=61s the newest point at or before t=1s is the t=0 one.
        let found = history.lookback(60 * SECOND, 61 * SECOND).unwrap();
        assert_eq!(found.timestamp, 0);

        // At t=91s the newest point at or before t=31s is the t=30s one.
        let found = history.lookback(60 * SECOND, 91 * SECOND).unwrap();
        assert_eq!(found.timestamp, 30 * SECOND);
        assert_eq!(found.price, Decimal::new(10300, 2));
    }

    #[test]
    fn test_recent_points_chronological() {
        let mut history = TickerHistory::new(100, 60);
        for i in 0..10 {
            history.append(point(i, 10000 + i));
        }

        let points = history.recent_points(3);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].timestamp, 7 * SECOND);
        assert_eq!(points[2].timestamp, 9 * SECOND);
    }

    #[test]
    fn test_prune_older_than() {
        let mut history = TickerHistory::new(100, 60);
        for i in 0..10 {
            history.append(point(i, 10000));
        }

        let removed = history.prune_older_than(5 * SECOND);
        assert_eq!(removed, 5);
        assert_eq!(history.recent_len(), 5);
        // Minute buffer is untouched by retention
        assert_eq!(history.minute_len(), 10);
    }

    #[test]
    fn test_store_unknown_ticker() {
        let store = HistoryStore::new(100, 60);
        let err = store.recent("XYZ", 10).unwrap_err();
        assert_eq!(err, HistoryError::UnknownTicker("XYZ".to_string()));
        assert!(store.lookback("XYZ", 60 * SECOND, 0).is_none());
    }

    #[test]
    fn test_store_append_creates_buffers() {
        let mut store = HistoryStore::new(100, 60);
        store.append("AAPL", point(0, 17550));
        store.append("AAPL", point(2, 17560));

        let points = store.recent("AAPL", 10).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn test_prices_since_window() {
        let mut history = TickerHistory::new(100, 60);
        history.append(point(0, 10000));
        history.append(point(100, 10100));
        history.append(point(200, 10200));

        let prices = history.prices_since(100 * SECOND);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0], Decimal::new(10100, 2));
    }

    proptest! {
        #[test]
        fn prop_capacity_never_exceeded(
            capacity in 1usize..50,
            appends in 0usize..200,
        ) {
            let mut history = TickerHistory::new(capacity, capacity);
            for i in 0..appends {
                history.append(point(i as i64, 10000));
                prop_assert!(history.recent_len() <= capacity);
                prop_assert!(history.minute_len() <= capacity);
            }
        }

        #[test]
        fn prop_lookback_result_is_old_enough(
            count in 2usize..80,
            duration_secs in 1i64..120,
        ) {
            let mut history = TickerHistory::new(100, 60);
            for i in 0..count {
                history.append(point(i as i64 * 2, 10000));
            }
            let now = (count as i64 * 2) * SECOND;
            if let Some(found) = history.lookback(duration_secs * SECOND, now) {
                prop_assert!(found.timestamp <= now - duration_secs * SECOND);
            }
        }
    }
}
