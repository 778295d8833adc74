// Sensor Rollup SQLite - Durable state and history
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Sensor Rollup SQLite
//!
//! SQLite substrate for the rollup core:
//!
//! - [`SqliteKeyValueStore`]: aggregation state as a replayable changelog
//! - [`SqliteTimeSeries`]: raw and aggregated history tables
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use rollup::{AggregatedRecord, AggregationEngine, FanoutRouter, HistoryRepository, Measurement, SensorRegistry};
//! use rollup_sqlite::{SqliteKeyValueStore, SqliteTimeSeries};
//!
//! let router = FanoutRouter::new(Arc::new(SensorRegistry::from_edges([("room1", "floor1")])));
//! let store = SqliteKeyValueStore::open_in_memory().unwrap();
//! let history = SqliteTimeSeries::<AggregatedRecord>::open_in_memory().unwrap();
//!
//! let mut engine = AggregationEngine::new(router, store, history);
//! engine.process(&Measurement::new("room1", 1, 10.0)).unwrap();
//!
//! let (_, history) = engine.into_parts();
//! let repository = HistoryRepository::new(history);
//! assert_eq!(repository.get("floor1", 0).unwrap().len(), 1);
//! ```

pub mod error;
pub mod kv;
pub mod series;

pub use error::{Result, SqliteStoreError};
pub use kv::SqliteKeyValueStore;
pub use series::{SeriesRow, SqliteTimeSeries};
