//! Partitioned processing
//!
//! Aggregate keys are spread across a fixed set of partitions by hashing.
//! Each partition owns its own [`AggregationEngine`] (and therefore its own
//! store and sink), so a key is only ever touched by one worker and the
//! read-modify-write needs no locks.
//!
//! A batch is routed once, bucketed by partition in arrival order, then each
//! bucket is applied sequentially on its own scoped thread.

use std::thread;

use xxhash_rust::xxh64::xxh64;

use crate::config::RollupConfig;
use crate::engine::{note_drop, AggregationEngine};
use crate::error::Result;
use crate::graph::SensorId;
use crate::metrics::EngineMetrics;
use crate::record::{AggregatedRecord, Measurement};
use crate::router::{FanoutRouter, RouteOutcome};
use crate::store::{KeyValueStore, RecordSink};

const PARTITION_SEED: u64 = 0;

/// Maps aggregate keys to partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    partitions: usize,
}

impl Partitioner {
    /// Create a partitioner; zero partitions is treated as one
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }

    /// Number of partitions
    pub fn partitions(&self) -> usize {
        self.partitions
    }

    /// Partition owning `key`
    pub fn partition_for(&self, key: &str) -> usize {
        (xxh64(key.as_bytes(), PARTITION_SEED) % self.partitions as u64) as usize
    }
}

/// One engine per partition behind a shared router
pub struct PartitionedEngine<S, K> {
    router: FanoutRouter,
    partitioner: Partitioner,
    engines: Vec<AggregationEngine<S, K>>,
    /// Ingest-side counters (received, routed, dropped)
    ingest: EngineMetrics,
}

impl<S, K> PartitionedEngine<S, K>
where
    S: KeyValueStore + Send,
    K: RecordSink + Send,
{
    /// Create `config.partitions` engines, building each one's store and sink
    /// with `make`
    pub fn new<F>(router: FanoutRouter, config: RollupConfig, mut make: F) -> Self
    where
        F: FnMut(usize) -> (S, K),
    {
        let partitioner = Partitioner::new(config.partitions);
        let engines = (0..partitioner.partitions())
            .map(|p| {
                let (store, sink) = make(p);
                AggregationEngine::with_config(router.clone(), store, sink, config.clone())
            })
            .collect();

        Self {
            router,
            partitioner,
            engines,
            ingest: EngineMetrics::new(),
        }
    }

    /// Key-to-partition mapping
    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Engine for one partition
    pub fn engine(&self, partition: usize) -> Option<&AggregationEngine<S, K>> {
        self.engines.get(partition)
    }

    /// Mutable engine for one partition
    pub fn engine_mut(&mut self, partition: usize) -> Option<&mut AggregationEngine<S, K>> {
        self.engines.get_mut(partition)
    }

    /// Engine that owns `key`
    pub fn engine_for(&self, key: &str) -> &AggregationEngine<S, K> {
        &self.engines[self.partitioner.partition_for(key)]
    }

    /// Process a batch of measurements
    ///
    /// Records are returned grouped by partition. Within a key they keep
    /// the order the measurements arrived in. If any partition fails, the
    /// first error (by partition index) is returned; the other partitions
    /// have still applied their buckets.
    pub fn process_batch(&mut self, batch: &[Measurement]) -> Result<Vec<AggregatedRecord>> {
        let mut buckets: Vec<Vec<(SensorId, Measurement)>> =
            vec![Vec::new(); self.partitioner.partitions()];

        for measurement in batch {
            self.ingest.measurements_received += 1;
            match self.router.route_outcome(measurement) {
                RouteOutcome::Routed(pairs) => {
                    let owner = self.partitioner.partition_for(&measurement.identifier);
                    self.engines[owner].observe_parents(&measurement.identifier)?;

                    self.ingest.pairs_routed += pairs.len() as u64;
                    for (key, m) in pairs {
                        buckets[self.partitioner.partition_for(&key)].push((key, m));
                    }
                }
                RouteOutcome::UnknownSensor => {
                    note_drop(&mut self.ingest, &measurement.identifier);
                }
            }
        }

        let results: Vec<Result<Vec<AggregatedRecord>>> = thread::scope(|scope| {
            let handles: Vec<_> = self
                .engines
                .iter_mut()
                .zip(buckets)
                .filter(|(_, bucket)| !bucket.is_empty())
                .map(|(engine, bucket)| {
                    scope.spawn(move || {
                        bucket
                            .iter()
                            .map(|(key, m)| engine.apply(key, m))
                            .collect::<Result<Vec<_>>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut records = Vec::new();
        for result in results {
            records.extend(result?);
        }
        Ok(records)
    }

    /// Counters summed over ingest and every partition
    pub fn metrics(&self) -> EngineMetrics {
        let mut total = self.ingest.clone();
        for engine in &self.engines {
            total.merge(engine.metrics());
        }
        total
    }

    /// Take every partition's store and sink back
    pub fn into_parts(self) -> Vec<(S, K)> {
        self.engines
            .into_iter()
            .map(AggregationEngine::into_parts)
            .collect()
    }
}
