// Sensor Rollup - Hierarchical power aggregation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Read-side analytics over persisted history
//!
//! [`HistoryRepository`] answers range, latest, trend and distribution
//! queries over a [`TimeSeriesStore`]. Queries only read, so one repository
//! can serve any number of concurrent callers.
//!
//! Empty inputs never produce NaN: trend queries fail with
//! [`AnalyticsError::InsufficientData`] and distributions come back empty.

use std::marker::PhantomData;

use crate::error::{AnalyticsError, Result};
use crate::record::{AggregatedRecord, Measurement, Timestamp};
use crate::store::TimeSeriesStore;

/// Default number of records averaged at each end of a trend
pub const DEFAULT_TREND_LIMIT: usize = 10;

/// A record that can be stored in a history series
pub trait HistoryRecord {
    /// Series key
    fn identifier(&self) -> &str;

    /// Ordering timestamp
    fn timestamp(&self) -> Timestamp;

    /// Value used by trend and distribution queries
    fn value(&self) -> f64;
}

impl HistoryRecord for Measurement {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn value(&self) -> f64 {
        self.value
    }
}

/// Aggregated history is analysed on the aggregate's sum
impl HistoryRecord for AggregatedRecord {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    fn value(&self) -> f64 {
        self.sum
    }
}

/// One interval of a fixed-width histogram
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionBucket {
    /// Inclusive lower bound
    pub lower: f64,
    /// Upper bound; exclusive except on the last bucket
    pub upper: f64,
    /// Records whose value fell in this bucket
    pub count: u64,
}

/// Queries over one time series
#[derive(Debug)]
pub struct HistoryRepository<R, S> {
    store: S,
    trend_limit: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R, S> HistoryRepository<R, S>
where
    R: HistoryRecord,
    S: TimeSeriesStore<R>,
{
    /// Create a repository over `store`
    pub fn new(store: S) -> Self {
        Self::with_trend_limit(store, DEFAULT_TREND_LIMIT)
    }

    /// Create a repository with a custom trend limit
    pub fn with_trend_limit(store: S, trend_limit: usize) -> Self {
        Self {
            store,
            trend_limit,
            _record: PhantomData,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable access to the underlying store
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Records with timestamp > `after`
    pub fn get(&self, identifier: &str, after: Timestamp) -> Result<Vec<R>> {
        self.store.range_after(identifier, after)
    }

    /// The `count` most recent records, newest first
    pub fn get_latest(&self, identifier: &str, count: usize) -> Result<Vec<R>> {
        self.store.latest(identifier, count)
    }

    /// Trend ratio using the configured limit
    pub fn trend(&self, identifier: &str, after: Timestamp) -> Result<f64> {
        self.get_trend(identifier, after, self.trend_limit)
    }

    /// Average of the earliest `limit` records after `after`, divided by the
    /// average of the `limit` most recent records overall
    pub fn get_trend(&self, identifier: &str, after: Timestamp, limit: usize) -> Result<f64> {
        let insufficient = || AnalyticsError::InsufficientData {
            identifier: identifier.to_string(),
        };

        let first = self.store.earliest_after(identifier, after, limit)?;
        let latest = self.store.latest(identifier, limit)?;

        let start = mean(&first).ok_or_else(insufficient)?;
        let end = mean(&latest).ok_or_else(insufficient)?;
        if end == 0.0 {
            return Err(AnalyticsError::ZeroBaseline {
                identifier: identifier.to_string(),
            }
            .into());
        }

        Ok(start / end)
    }

    /// Fixed-width histogram of values after `after`
    ///
    /// Returns `buckets_count` contiguous buckets spanning `[min, max]`, or no
    /// buckets when there is no data. When every value is equal, all buckets
    /// collapse to `[min, max]` and only the first one is counted.
    pub fn get_distribution(
        &self,
        identifier: &str,
        after: Timestamp,
        buckets_count: usize,
    ) -> Result<Vec<DistributionBucket>> {
        if buckets_count == 0 {
            return Err(AnalyticsError::InvalidBucketCount(buckets_count).into());
        }

        let values: Vec<f64> = self
            .store
            .range_after(identifier, after)?
            .iter()
            .map(HistoryRecord::value)
            .collect();
        Ok(distribution(&values, buckets_count))
    }
}

fn mean<R: HistoryRecord>(records: &[R]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    Some(records.iter().map(HistoryRecord::value).sum::<f64>() / records.len() as f64)
}

fn distribution(values: &[f64], buckets_count: usize) -> Vec<DistributionBucket> {
    if values.is_empty() {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let slice = (max - min) / buckets_count as f64;

    let mut counts = vec![0u64; buckets_count];
    if slice > 0.0 {
        for value in values {
            let index = ((value - min) / slice).floor();
            let index = (index.max(0.0) as usize).min(buckets_count - 1);
            counts[index] += 1;
        }
    } else {
        counts[0] = values.len() as u64;
    }

    let mut buckets = Vec::with_capacity(buckets_count);
    let mut lower = min;
    for (i, count) in counts.into_iter().enumerate() {
        let upper = if i + 1 == buckets_count {
            max
        } else {
            min + (i + 1) as f64 * slice
        };
        buckets.push(DistributionBucket {
            lower,
            upper,
            count,
        });
        lower = upper;
    }
    buckets
}
