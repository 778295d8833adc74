//! # Sensor Rollup - Hierarchical power aggregation
//!
//! Continuously maintained aggregates (count, sum, min, max, average) for
//! every non-leaf node of a sensor hierarchy, persisted as a time series and
//! queried for trends and value distributions.
//!
//! ## Key Features
//!
//! - **DAG fan-out**: a measurement feeds every direct parent of its sensor
//! - **Crash-recoverable state**: per-key state blobs in a changelog store
//! - **Add/subtract windows**: retract expired records without rescanning
//! - **Read-side analytics**: trend ratios and fixed-width histograms
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use rollup::{
//!     AggregatedRecord, AggregationEngine, FanoutRouter, HistoryRepository, Measurement,
//!     MemoryKeyValueStore, MemoryTimeSeries, SensorRegistry,
//! };
//!
//! let graph = SensorRegistry::from_edges([("room1", "floor1"), ("room2", "floor1")]);
//! let router = FanoutRouter::new(Arc::new(graph));
//! let history: MemoryTimeSeries<AggregatedRecord> = MemoryTimeSeries::new();
//! let mut engine = AggregationEngine::new(router, MemoryKeyValueStore::new(), history);
//!
//! engine.process(&Measurement::new("room1", 1, 10.0)).unwrap();
//! engine.process(&Measurement::new("room2", 2, 20.0)).unwrap();
//!
//! let (_, history) = engine.into_parts();
//! let repository = HistoryRepository::new(history);
//! let latest = repository.get_latest("floor1", 1).unwrap();
//! assert_eq!(latest[0].count, 2);
//! assert_eq!(latest[0].average, Some(15.0));
//! ```
//!
//! ## Modules
//!
//! - [`record`]: Input measurements and output aggregate records
//! - [`graph`]: Sensor hierarchy lookup
//! - [`router`]: Fan-out to direct parents
//! - [`state`]: Add-only aggregation state
//! - [`windowed`]: Add/subtract windowed aggregation
//! - [`codec`]: Binary encoding of persisted state
//! - [`store`]: Key-value and time-series store abstractions
//! - [`engine`]: Per-worker read-modify-write pipeline
//! - [`partition`]: Key partitioning across workers
//! - [`history`]: Trend and distribution queries
//! - [`metrics`]: Engine counters

// Modules
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod history;
pub mod metrics;
pub mod partition;
pub mod record;
pub mod router;
pub mod state;
pub mod store;
pub mod windowed;

// Re-exports for convenient access
pub use codec::{AggregationStateCodec, OptionalParentsCodec, StateCodec, STATE_FORMAT_VERSION};
pub use config::{RollupConfig, DEFAULT_LAST_VALUES_CAPACITY, FLOAT_TOLERANCE};
pub use engine::AggregationEngine;
pub use error::{AnalyticsError, ContractError, DecodeError, Result, RollupError, StoreError};
pub use graph::{SensorGraph, SensorId, SensorNode, SensorRegistry};
pub use history::{DistributionBucket, HistoryRecord, HistoryRepository, DEFAULT_TREND_LIMIT};
pub use metrics::EngineMetrics;
pub use partition::{PartitionedEngine, Partitioner};
pub use record::{AggregatedRecord, Measurement, Timestamp};
pub use router::{FanoutRouter, RouteOutcome};
pub use state::AggregationState;
pub use store::{
    ChangelogEntry, KeyValueStore, MemoryKeyValueStore, MemoryTimeSeries, ParentChange,
    ParentsCache, RecordSink, TimeSeriesStore,
};
pub use windowed::{RollingWindowAggregator, WindowedAggregate, WindowedAggregator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
