//! Aggregation state for the add-only path
//!
//! An [`AggregationState`] is the per-key running summary of every
//! measurement routed to an aggregate node. Updates never mutate a state in
//! place: [`AggregationState::update`] returns a fresh snapshot, so a stored
//! value is only ever replaced as a whole.

use std::collections::VecDeque;

use crate::config::DEFAULT_LAST_VALUES_CAPACITY;
use crate::record::{AggregatedRecord, Measurement, Timestamp};

/// Running statistics for one aggregate node
///
/// Invariant: `count == 0` exactly when `sum == 0.0` and both extrema are
/// `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationState {
    /// Measurements folded in so far
    pub count: u64,
    /// Sum of their values
    pub sum: f64,
    /// Smallest value, `None` while empty
    pub min: Option<f64>,
    /// Largest value, `None` while empty
    pub max: Option<f64>,
    /// Timestamp of the latest update applied
    pub last_timestamp: Timestamp,
    /// Most recent raw values in arrival order, oldest first
    last_values: VecDeque<f64>,
    /// Maximum length of `last_values`
    capacity: usize,
}

impl AggregationState {
    /// Zero-state with the default last-values capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LAST_VALUES_CAPACITY)
    }

    /// Zero-state with a custom last-values capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
            last_timestamp: 0,
            last_values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a state from its parts (used by the codec)
    pub(crate) fn from_parts(
        count: u64,
        sum: f64,
        extrema: Option<(f64, f64)>,
        last_timestamp: Timestamp,
        last_values: VecDeque<f64>,
        capacity: usize,
    ) -> Self {
        Self {
            count,
            sum,
            min: extrema.map(|(min, _)| min),
            max: extrema.map(|(_, max)| max),
            last_timestamp,
            last_values,
            capacity,
        }
    }

    /// Fold one measurement in, returning the new snapshot
    ///
    /// The last-values FIFO follows arrival order, not timestamp order;
    /// count, sum and extrema are order-independent.
    pub fn update(&self, measurement: &Measurement) -> Self {
        let value = measurement.value;

        let mut last_values = self.last_values.clone();
        if self.capacity > 0 {
            if last_values.len() >= self.capacity {
                last_values.pop_front();
            }
            last_values.push_back(value);
        }

        Self {
            count: self.count + 1,
            sum: self.sum + value,
            min: Some(self.min.map_or(value, |m| m.min(value))),
            max: Some(self.max.map_or(value, |m| m.max(value))),
            last_timestamp: measurement.timestamp,
            last_values,
            capacity: self.capacity,
        }
    }

    /// Snapshot this state as the output record for `identifier`
    pub fn to_record(&self, identifier: &str) -> AggregatedRecord {
        AggregatedRecord {
            identifier: identifier.to_string(),
            timestamp: self.last_timestamp,
            min: self.min.unwrap_or(0.0),
            max: self.max.unwrap_or(0.0),
            count: self.count,
            sum: self.sum,
            average: self.average(),
        }
    }

    /// `sum / count`, or `None` for the zero-state
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    /// Check if no measurement has been applied
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Recent raw values, oldest first
    pub fn last_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.last_values.iter().copied()
    }

    /// Number of values currently held in the FIFO
    pub fn last_values_len(&self) -> usize {
        self.last_values.len()
    }

    /// Most recent raw value
    pub fn last_value(&self) -> Option<f64> {
        self.last_values.back().copied()
    }

    /// FIFO capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for AggregationState {
    fn default() -> Self {
        Self::new()
    }
}
