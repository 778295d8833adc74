//! Storage abstractions
//!
//! This module provides traits and in-memory implementations for the two
//! stores the rollup needs:
//! - [`KeyValueStore`]: keyed state blobs with changelog replay recovery
//! - [`TimeSeriesStore`]: records keyed by identifier, ordered by timestamp
//!
//! plus the [`RecordSink`] the engine emits into and the [`ParentsCache`]
//! kept alongside aggregation state.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::codec::OptionalParentsCodec;
use crate::error::{Result, StoreError};
use crate::graph::SensorId;
use crate::history::HistoryRecord;
use crate::record::{AggregatedRecord, Timestamp};

/// Durable keyed blob store
///
/// A zero-length value is a tombstone: `get` reports it as absent.
pub trait KeyValueStore {
    /// Read the current value for a key
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the value for a key
    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Write a tombstone for a key
    fn delete(&mut self, key: &str) -> Result<()> {
        self.put(key, Vec::new())
    }
}

/// One write in a store's change history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogEntry {
    /// Position in the changelog, starting at 0
    pub offset: u64,
    /// Written key
    pub key: String,
    /// Written value, empty for a tombstone
    pub value: Vec<u8>,
}

/// In-memory key-value store with a replayable changelog
#[derive(Debug)]
pub struct MemoryKeyValueStore {
    data: HashMap<String, Vec<u8>>,
    changelog: Vec<ChangelogEntry>,
    committed: u64,
    available: bool,
}

impl MemoryKeyValueStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            changelog: Vec::new(),
            committed: 0,
            available: true,
        }
    }

    /// Rebuild a store by replaying `changelog` entries below offset `upto`
    ///
    /// Entries past `upto` were never committed and are discarded.
    pub fn restore(changelog: &[ChangelogEntry], upto: u64) -> Self {
        let mut store = Self::new();
        for entry in changelog.iter().filter(|e| e.offset < upto) {
            store.apply(entry.clone());
        }
        store.committed = store.changelog.len() as u64;
        log::info!(
            "Restored {} keys from {} changelog entries",
            store.data.len(),
            store.changelog.len()
        );
        store
    }

    /// Mark everything written so far as durable, returning the new offset
    pub fn commit(&mut self) -> u64 {
        self.committed = self.changelog.len() as u64;
        self.committed
    }

    /// Offset up to which writes are durable
    pub fn committed_offset(&self) -> u64 {
        self.committed
    }

    /// Full change history
    pub fn changelog(&self) -> &[ChangelogEntry] {
        &self.changelog
    }

    /// Writes made since the last commit
    pub fn uncommitted(&self) -> &[ChangelogEntry] {
        &self.changelog[self.committed as usize..]
    }

    /// Number of live (non-tombstoned) keys
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if no live key exists
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Simulate the substrate going away; every call fails until restored
    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    fn check_available(&self) -> Result<()> {
        if !self.available {
            return Err(StoreError::Io("store unavailable".to_string()).into());
        }
        Ok(())
    }

    fn apply(&mut self, entry: ChangelogEntry) {
        if entry.value.is_empty() {
            self.data.remove(&entry.key);
        } else {
            self.data.insert(entry.key.clone(), entry.value.clone());
        }
        self.changelog.push(ChangelogEntry {
            offset: self.changelog.len() as u64,
            ..entry
        });
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_available()?;
        self.apply(ChangelogEntry {
            offset: 0,
            key: key.to_string(),
            value,
        });
        Ok(())
    }
}

/// Time series of records keyed by identifier and timestamp
///
/// One record is kept per `(identifier, timestamp)`; appending a second
/// record at the same position replaces the first.
pub trait TimeSeriesStore<R> {
    /// Insert or replace a record
    fn append(&mut self, record: R) -> Result<()>;

    /// Records for `identifier` with timestamp > `after`, ascending
    fn range_after(&self, identifier: &str, after: Timestamp) -> Result<Vec<R>>;

    /// Up to `count` most recent records for `identifier`, descending
    fn latest(&self, identifier: &str, count: usize) -> Result<Vec<R>>;

    /// Up to `limit` earliest records for `identifier` after `after`, ascending
    fn earliest_after(&self, identifier: &str, after: Timestamp, limit: usize) -> Result<Vec<R>> {
        let mut records = self.range_after(identifier, after)?;
        records.truncate(limit);
        Ok(records)
    }
}

/// In-memory time series
#[derive(Debug, Clone)]
pub struct MemoryTimeSeries<R> {
    series: HashMap<String, BTreeMap<Timestamp, R>>,
}

impl<R> MemoryTimeSeries<R> {
    /// Create an empty series
    pub fn new() -> Self {
        Self {
            series: HashMap::new(),
        }
    }

    /// Total records held
    pub fn len(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    /// Check if no record is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for MemoryTimeSeries<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: HistoryRecord + Clone> TimeSeriesStore<R> for MemoryTimeSeries<R> {
    fn append(&mut self, record: R) -> Result<()> {
        self.series
            .entry(record.identifier().to_string())
            .or_default()
            .insert(record.timestamp(), record);
        Ok(())
    }

    fn range_after(&self, identifier: &str, after: Timestamp) -> Result<Vec<R>> {
        Ok(self
            .series
            .get(identifier)
            .map(|s| {
                s.range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                    .map(|(_, r)| r.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn latest(&self, identifier: &str, count: usize) -> Result<Vec<R>> {
        Ok(self
            .series
            .get(identifier)
            .map(|s| s.values().rev().take(count).cloned().collect())
            .unwrap_or_default())
    }
}

/// Downstream destination for emitted aggregates
pub trait RecordSink {
    /// Accept one emitted record
    fn emit(&mut self, record: AggregatedRecord) -> Result<()>;
}

impl RecordSink for Vec<AggregatedRecord> {
    fn emit(&mut self, record: AggregatedRecord) -> Result<()> {
        self.push(record);
        Ok(())
    }
}

impl RecordSink for MemoryTimeSeries<AggregatedRecord> {
    fn emit(&mut self, record: AggregatedRecord) -> Result<()> {
        self.append(record)
    }
}

impl<T: RecordSink + ?Sized> RecordSink for &mut T {
    fn emit(&mut self, record: AggregatedRecord) -> Result<()> {
        (**self).emit(record)
    }
}

/// Key prefix for cached parent sets
pub const PARENTS_KEY_PREFIX: &str = "@parents/";

/// How a sensor's parent set compares to the cached one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentChange {
    /// Nothing was cached for the sensor
    FirstSeen,
    /// Cached set equals the current one
    Unchanged,
    /// Cached set differs from the current one
    Changed {
        /// Set cached before this observation
        previous: BTreeSet<SensorId>,
    },
}

/// Last-seen parent set per sensor, persisted next to aggregation state
///
/// A sensor never observed has no entry (absent); a known root is stored as
/// a present empty set.
#[derive(Debug, Clone, Default)]
pub struct ParentsCache {
    codec: OptionalParentsCodec,
}

impl ParentsCache {
    /// Create a cache helper
    pub fn new() -> Self {
        Self::default()
    }

    /// Store key for a sensor's cached set
    pub fn key(sensor: &str) -> String {
        format!("{}{}", PARENTS_KEY_PREFIX, sensor)
    }

    /// Read the cached set; undecodable entries read as absent
    pub fn load<S: KeyValueStore + ?Sized>(
        &self,
        store: &S,
        sensor: &str,
    ) -> Result<Option<BTreeSet<SensorId>>> {
        let Some(bytes) = store.get(&Self::key(sensor))? else {
            return Ok(None);
        };
        match self.codec.decode(&bytes) {
            Ok(parents) => Ok(parents),
            Err(e) => {
                log::warn!("Discarding unreadable parent set for '{}': {}", sensor, e);
                Ok(None)
            }
        }
    }

    /// Compare `parents` with the cached set and store it when different
    pub fn observe<S: KeyValueStore + ?Sized>(
        &self,
        store: &mut S,
        sensor: &str,
        parents: &BTreeSet<SensorId>,
    ) -> Result<ParentChange> {
        let change = match self.load(store, sensor)? {
            None => ParentChange::FirstSeen,
            Some(previous) if &previous == parents => return Ok(ParentChange::Unchanged),
            Some(previous) => ParentChange::Changed { previous },
        };
        store.put(&Self::key(sensor), self.codec.encode(Some(parents)))?;
        Ok(change)
    }
}
