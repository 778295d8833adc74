// Sensor Rollup - Hierarchical power aggregation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Aggregation engine
//!
//! The [`AggregationEngine`] runs the add path for one worker:
//!
//! ```text
//! measurement ─▶ route ─▶ (key, measurement)* ─▶ load ─▶ update ─▶ put ─▶ emit
//! ```
//!
//! Every key is a strict read-modify-write. The engine takes `&mut self`, so
//! two updates on the keys it owns can never interleave. Store failures are
//! returned to the caller untouched; retrying is the caller's decision.
//!
//! Delivery is assumed at-least-once: applying the same measurement twice
//! counts it twice. Deduplication belongs to the transport feeding the engine.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rollup::{
//!     AggregatedRecord, AggregationEngine, FanoutRouter, Measurement, MemoryKeyValueStore,
//!     SensorRegistry,
//! };
//!
//! let graph = SensorRegistry::from_edges([("room1", "floor1")]);
//! let router = FanoutRouter::new(Arc::new(graph));
//! let sink: Vec<AggregatedRecord> = Vec::new();
//! let mut engine = AggregationEngine::new(router, MemoryKeyValueStore::new(), sink);
//!
//! let emitted = engine.process(&Measurement::new("room1", 1, 10.0)).unwrap();
//! assert_eq!(emitted[0].identifier, "floor1");
//! ```

use std::collections::HashMap;

use crate::codec::{AggregationStateCodec, StateCodec};
use crate::config::RollupConfig;
use crate::error::{Result, RollupError};
use crate::metrics::EngineMetrics;
use crate::record::{AggregatedRecord, Measurement};
use crate::router::{FanoutRouter, RouteOutcome};
use crate::state::AggregationState;
use crate::store::{KeyValueStore, ParentChange, ParentsCache, RecordSink};

/// Per-worker aggregation engine
#[derive(Debug)]
pub struct AggregationEngine<S, K> {
    router: FanoutRouter,
    store: S,
    sink: K,
    codec: AggregationStateCodec,
    parents: Option<ParentsCache>,
    config: RollupConfig,
    metrics: EngineMetrics,
    /// Consecutive decode failures per key
    decode_failures: HashMap<String, u32>,
}

impl<S: KeyValueStore, K: RecordSink> AggregationEngine<S, K> {
    /// Create an engine with default configuration
    pub fn new(router: FanoutRouter, store: S, sink: K) -> Self {
        Self::with_config(router, store, sink, RollupConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(router: FanoutRouter, store: S, sink: K, config: RollupConfig) -> Self {
        Self {
            router,
            store,
            sink,
            codec: AggregationStateCodec::new(),
            parents: None,
            config,
            metrics: EngineMetrics::new(),
            decode_failures: HashMap::new(),
        }
    }

    /// Track each sensor's parent set in the state store
    pub fn with_parents_cache(mut self) -> Self {
        self.parents = Some(ParentsCache::new());
        self
    }

    /// Route one measurement and apply it to every direct parent
    ///
    /// Unknown sensors are dropped and counted, never reported as errors.
    ///
    /// Parents are applied in routing order and each one is stored and
    /// emitted before the next is loaded. If a later parent fails, the
    /// earlier ones stay applied; retrying the whole measurement counts them
    /// again. Callers that retry should use [`AggregationEngine::apply`] for
    /// the parents that did not complete. A sink failure is reported after
    /// that parent's state was already stored.
    pub fn process(&mut self, measurement: &Measurement) -> Result<Vec<AggregatedRecord>> {
        self.metrics.measurements_received += 1;

        let pairs = match self.router.route_outcome(measurement) {
            RouteOutcome::Routed(pairs) => pairs,
            RouteOutcome::UnknownSensor => {
                note_drop(&mut self.metrics, &measurement.identifier);
                return Ok(Vec::new());
            }
        };

        self.observe_parents(&measurement.identifier)?;
        self.metrics.pairs_routed += pairs.len() as u64;

        pairs
            .iter()
            .map(|(key, m)| self.apply(key, m))
            .collect()
    }

    /// Apply one routed pair: load, update, store, emit
    pub fn apply(&mut self, key: &str, measurement: &Measurement) -> Result<AggregatedRecord> {
        let state = self.load_state(key)?;
        let updated = state.update(measurement);

        self.store.put(key, self.codec.encode(&updated))?;

        let record = updated.to_record(key);
        self.sink.emit(record.clone())?;
        self.metrics.records_emitted += 1;
        log::debug!(
            "Emitted '{}' at {}: count={} sum={}",
            key,
            record.timestamp,
            record.count,
            record.sum
        );

        Ok(record)
    }

    /// Load the state for `key`, falling back to the zero-state
    ///
    /// An undecodable blob is treated as absent and logged. After
    /// `decode_failure_limit` consecutive failures on the same key the
    /// engine stops and reports [`RollupError::StateCorruption`].
    pub fn load_state(&mut self, key: &str) -> Result<AggregationState> {
        let capacity = self.config.last_values_capacity;
        let zero = move || AggregationState::with_capacity(capacity);

        let Some(bytes) = self.store.get(key)? else {
            return Ok(zero());
        };

        match self.codec.decode(&bytes) {
            Ok(state) => {
                self.decode_failures.remove(key);
                Ok(state.unwrap_or_else(zero))
            }
            Err(e) => {
                self.metrics.decode_failures += 1;
                let failures = self.decode_failures.entry(key.to_string()).or_insert(0);
                *failures += 1;
                let failures = *failures;

                if failures >= self.config.decode_failure_limit.max(1) {
                    log::error!(
                        "State for '{}' failed to decode {} times in a row: {}",
                        key,
                        failures,
                        e
                    );
                    return Err(RollupError::StateCorruption {
                        key: key.to_string(),
                        failures,
                    });
                }
                if failures == 1 {
                    log::warn!("Discarding undecodable state for '{}': {}", key, e);
                }
                Ok(zero())
            }
        }
    }

    /// Decoded state currently stored for `key`, without side effects
    pub fn state(&self, key: &str) -> Result<Option<AggregationState>> {
        match self.store.get(key)? {
            Some(bytes) => Ok(self.codec.decode(&bytes)?),
            None => Ok(None),
        }
    }

    /// Record `sensor`'s current parent set if the cache is enabled
    pub fn observe_parents(&mut self, sensor: &str) -> Result<Option<ParentChange>> {
        let Some(cache) = &self.parents else {
            return Ok(None);
        };
        let Some(parents) = self.router.graph().parents(sensor) else {
            return Ok(None);
        };

        let change = cache.observe(&mut self.store, sensor, parents)?;
        if let ParentChange::Changed { previous } = &change {
            self.metrics.parent_set_changes += 1;
            log::warn!(
                "Parents of '{}' changed from {:?} to {:?}",
                sensor,
                previous,
                parents
            );
        }
        Ok(Some(change))
    }

    /// Engine counters
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Mutable engine counters
    pub fn metrics_mut(&mut self) -> &mut EngineMetrics {
        &mut self.metrics
    }

    /// Engine configuration
    pub fn config(&self) -> &RollupConfig {
        &self.config
    }

    /// Router used for fan-out
    pub fn router(&self) -> &FanoutRouter {
        &self.router
    }

    /// State store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable state store
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Downstream sink
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Mutable downstream sink
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    /// Take the store and sink back
    pub fn into_parts(self) -> (S, K) {
        (self.store, self.sink)
    }
}

/// Count an unknown-sensor drop; loud the first time, quiet afterwards
pub(crate) fn note_drop(metrics: &mut EngineMetrics, identifier: &str) {
    let seen = metrics.record_drop(identifier);
    if seen == 1 {
        log::warn!("Dropping measurement from unknown sensor '{}'", identifier);
    } else {
        log::debug!(
            "Dropping measurement from unknown sensor '{}' ({} so far)",
            identifier,
            seen
        );
    }
}
