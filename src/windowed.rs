//! Windowed add/subtract aggregation
//!
//! [`WindowedAggregator`] updates a rolling aggregate incrementally: new
//! records are added and expired records are subtracted, so the window never
//! has to be rescanned. [`RollingWindowAggregator`] drives it over a fixed
//! time window per key.
//!
//! `add` stamps the aggregate with the incoming record's time while
//! `subtract` keeps the aggregate's own time.

use std::collections::{HashMap, VecDeque};

use crate::error::{ContractError, Result};
use crate::record::{Measurement, Timestamp};

/// Snapshot of a windowed aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedAggregate {
    /// Aggregate key
    pub identifier: String,
    /// Timestamp of the latest added record
    pub timestamp: Timestamp,
    /// Records currently in the aggregate
    pub count: u64,
    /// Sum of their values
    pub sum: f64,
    /// `sum / count`, `None` for a zero-count tombstone
    pub average: Option<f64>,
}

impl WindowedAggregate {
    /// Check if this is a zero-count tombstone
    pub fn is_tombstone(&self) -> bool {
        self.count == 0
    }
}

/// Stateless add/subtract pair
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowedAggregator;

impl WindowedAggregator {
    /// Create an aggregator
    pub fn new() -> Self {
        Self
    }

    /// Add a record; an absent aggregate counts as empty
    pub fn add(
        &self,
        identifier: &str,
        measurement: &Measurement,
        current: Option<&WindowedAggregate>,
    ) -> WindowedAggregate {
        let (count, sum) = current.map_or((0, 0.0), |c| (c.count, c.sum));
        let count = count + 1;
        let sum = sum + measurement.value;

        WindowedAggregate {
            identifier: identifier.to_string(),
            timestamp: measurement.timestamp,
            count,
            sum,
            average: Some(sum / count as f64),
        }
    }

    /// Retract a record from an existing aggregate
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::SubtractFromAbsent`] when there is nothing to
    /// subtract from (absent aggregate or zero-count tombstone).
    pub fn subtract(
        &self,
        identifier: &str,
        measurement: &Measurement,
        current: Option<&WindowedAggregate>,
    ) -> Result<WindowedAggregate> {
        let current = match current {
            Some(c) if c.count > 0 => c,
            _ => {
                return Err(ContractError::SubtractFromAbsent {
                    identifier: identifier.to_string(),
                }
                .into())
            }
        };

        let count = current.count - 1;
        if count == 0 {
            return Ok(WindowedAggregate {
                identifier: identifier.to_string(),
                timestamp: current.timestamp,
                count: 0,
                sum: 0.0,
                average: None,
            });
        }

        let sum = current.sum - measurement.value;
        Ok(WindowedAggregate {
            identifier: identifier.to_string(),
            timestamp: current.timestamp,
            count,
            sum,
            average: Some(sum / count as f64),
        })
    }
}

/// Per-key window contents
#[derive(Debug, Default)]
struct KeyWindow {
    entries: VecDeque<Measurement>,
    aggregate: Option<WindowedAggregate>,
    watermark: Timestamp,
}

/// Rolling time-window aggregate per key
///
/// Records older than `window_ms` relative to the newest timestamp seen for
/// the key are subtracted out as the window advances.
#[derive(Debug)]
pub struct RollingWindowAggregator {
    window_ms: i64,
    aggregator: WindowedAggregator,
    windows: HashMap<String, KeyWindow>,
}

impl RollingWindowAggregator {
    /// Create a rolling aggregator with the given window length
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            aggregator: WindowedAggregator::new(),
            windows: HashMap::new(),
        }
    }

    /// Window length in milliseconds
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Add a measurement under `key`, expiring what fell out of the window
    ///
    /// Returns `None` when the measurement is already older than the window
    /// and was ignored.
    pub fn push(&mut self, key: &str, measurement: Measurement) -> Result<Option<WindowedAggregate>> {
        let window_ms = self.window_ms;
        let aggregator = self.aggregator;
        let window = self.windows.entry(key.to_string()).or_default();

        let now = window.watermark.max(measurement.timestamp);
        let cutoff = now - window_ms;
        if measurement.timestamp <= cutoff {
            log::debug!(
                "Ignoring late measurement for '{}' at {} (cutoff {})",
                key,
                measurement.timestamp,
                cutoff
            );
            return Ok(None);
        }

        Self::expire(&aggregator, key, window, cutoff)?;
        window.watermark = now;

        let updated = aggregator.add(key, &measurement, window.aggregate.as_ref());
        window.entries.push_back(measurement);
        window.aggregate = Some(updated.clone());
        Ok(Some(updated))
    }

    /// Advance `key`'s window to `now` without adding anything
    ///
    /// A window that empties out returns its tombstone once and is then
    /// forgotten, watermark included.
    pub fn advance(&mut self, key: &str, now: Timestamp) -> Result<Option<WindowedAggregate>> {
        let window_ms = self.window_ms;
        let aggregator = self.aggregator;
        let Some(window) = self.windows.get_mut(key) else {
            return Ok(None);
        };
        window.watermark = window.watermark.max(now);
        let cutoff = window.watermark - window_ms;
        Self::expire(&aggregator, key, window, cutoff)?;

        if window.entries.is_empty() {
            let last = self.windows.remove(key).and_then(|w| w.aggregate);
            return Ok(last);
        }
        Ok(window.aggregate.clone())
    }

    /// Number of keys with a live window
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Current aggregate for a key
    pub fn current(&self, key: &str) -> Option<&WindowedAggregate> {
        self.windows.get(key).and_then(|w| w.aggregate.as_ref())
    }

    /// Number of records held in `key`'s window
    pub fn window_len(&self, key: &str) -> usize {
        self.windows.get(key).map_or(0, |w| w.entries.len())
    }

    fn expire(
        aggregator: &WindowedAggregator,
        key: &str,
        window: &mut KeyWindow,
        cutoff: Timestamp,
    ) -> Result<()> {
        let mut kept = VecDeque::with_capacity(window.entries.len());
        while let Some(entry) = window.entries.pop_front() {
            if entry.timestamp <= cutoff {
                window.aggregate =
                    Some(aggregator.subtract(key, &entry, window.aggregate.as_ref())?);
            } else {
                kept.push_back(entry);
            }
        }
        window.entries = kept;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RollupError;

    #[test]
    fn test_add_from_absent() {
        let agg = WindowedAggregator::new();
        let result = agg.add("floor1", &Measurement::new("room1", 7, 12.0), None);
        assert_eq!(result.count, 1);
        assert_eq!(result.sum, 12.0);
        assert_eq!(result.timestamp, 7);
        assert_eq!(result.average, Some(12.0));
    }

    #[test]
    fn test_add_then_subtract_restores_count_and_sum() {
        let agg = WindowedAggregator::new();
        let base = agg.add("k", &Measurement::new("s", 10, 4.0), None);
        let base = agg.add("k", &Measurement::new("s", 20, 6.0), Some(&base));

        let m = Measurement::new("s", 50, 8.0);
        let added = agg.add("k", &m, Some(&base));
        assert_eq!(added.timestamp, 50);

        let restored = agg.subtract("k", &m, Some(&added)).unwrap();
        assert_eq!(restored.count, base.count);
        assert_eq!(restored.sum, base.sum);
        // subtract keeps the aggregate's own timestamp instead of reverting it
        assert_eq!(restored.timestamp, 50);
        assert_ne!(restored.timestamp, base.timestamp);
    }

    #[test]
    fn test_subtract_to_zero_is_tombstone() {
        let agg = WindowedAggregator::new();
        let m = Measurement::new("s", 1, 3.0);
        let one = agg.add("k", &m, None);
        let zero = agg.subtract("k", &m, Some(&one)).unwrap();

        assert!(zero.is_tombstone());
        assert_eq!(zero.sum, 0.0);
        assert_eq!(zero.average, None);
    }

    #[test]
    fn test_subtract_from_absent_fails() {
        let agg = WindowedAggregator::new();
        let result = agg.subtract("k", &Measurement::new("s", 1, 3.0), None);
        assert!(matches!(result, Err(RollupError::Contract(_))));
    }

    #[test]
    fn test_subtract_from_tombstone_fails() {
        let agg = WindowedAggregator::new();
        let m = Measurement::new("s", 1, 3.0);
        let zero = agg
            .subtract("k", &m, Some(&agg.add("k", &m, None)))
            .unwrap();
        assert!(agg.subtract("k", &m, Some(&zero)).is_err());
    }

    #[test]
    fn test_rolling_window_expires() {
        let mut rolling = RollingWindowAggregator::new(100);
        rolling.push("k", Measurement::new("s", 0, 10.0)).unwrap();
        rolling.push("k", Measurement::new("s", 50, 20.0)).unwrap();
        let current = rolling
            .push("k", Measurement::new("s", 120, 30.0))
            .unwrap()
            .unwrap();

        // t=0 fell out of (20, 120]
        assert_eq!(current.count, 2);
        assert_eq!(current.sum, 50.0);
        assert_eq!(rolling.window_len("k"), 2);
    }

    #[test]
    fn test_rolling_window_late_record_ignored() {
        let mut rolling = RollingWindowAggregator::new(100);
        rolling.push("k", Measurement::new("s", 500, 1.0)).unwrap();
        let late = rolling.push("k", Measurement::new("s", 100, 1.0)).unwrap();
        assert!(late.is_none());
        assert_eq!(rolling.current("k").unwrap().count, 1);
    }

    #[test]
    fn test_rolling_window_advance_to_empty() {
        let mut rolling = RollingWindowAggregator::new(100);
        rolling.push("k", Measurement::new("s", 0, 10.0)).unwrap();
        rolling.push("k", Measurement::new("s", 10, 10.0)).unwrap();

        let after = rolling.advance("k", 1_000).unwrap().unwrap();
        assert!(after.is_tombstone());
        assert_eq!(after.timestamp, 10);
        assert_eq!(rolling.window_len("k"), 0);
        assert!(rolling.current("k").is_none());
        assert!(rolling.advance("k", 2_000).unwrap().is_none());
        assert!(rolling.advance("missing", 0).unwrap().is_none());
    }

    #[test]
    fn test_rolling_window_forgets_expired_keys() {
        let mut rolling = RollingWindowAggregator::new(100);
        for i in 0..1_000 {
            let key = format!("k{}", i);
            rolling.push(&key, Measurement::new("s", i, 1.0)).unwrap();
            rolling.advance(&key, i + 500).unwrap();
        }
        assert_eq!(rolling.tracked_keys(), 0);
        assert_eq!(rolling.window_len("k7"), 0);
        assert!(rolling.current("k7").is_none());

        // a forgotten key starts again from absent
        let fresh = rolling
            .push("k7", Measurement::new("s", 5_000, 2.0))
            .unwrap()
            .unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.sum, 2.0);
        assert_eq!(rolling.tracked_keys(), 1);
    }
}
