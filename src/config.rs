//! Configuration types for the rollup core

use serde::{Deserialize, Serialize};

/// Default size K of the per-aggregate last-values FIFO
pub const DEFAULT_LAST_VALUES_CAPACITY: usize = 10;

/// Tolerance used when comparing floating sums and averages
pub const FLOAT_TOLERANCE: f64 = 1e-9;

/// Core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollupConfig {
    /// Capacity of the last-values FIFO kept per aggregate
    pub last_values_capacity: usize,

    /// Consecutive decode failures on one key before it is reported as corrupt
    pub decode_failure_limit: u32,

    /// Number of records averaged at each end of a trend query
    pub trend_limit: usize,

    /// Worker partitions for the partitioned engine
    pub partitions: usize,

    /// Rolling window length in milliseconds
    pub window_ms: i64,
}

impl Default for RollupConfig {
    fn default() -> Self {
        Self {
            last_values_capacity: DEFAULT_LAST_VALUES_CAPACITY,
            decode_failure_limit: 3,
            trend_limit: 10,
            partitions: 4,
            window_ms: 60_000,
        }
    }
}

impl RollupConfig {
    /// Create a configuration with a custom partition count
    pub fn with_partitions(partitions: usize) -> Self {
        Self {
            partitions,
            ..Default::default()
        }
    }

    /// Create a configuration with a custom rolling window
    pub fn with_window_ms(window_ms: i64) -> Self {
        Self {
            window_ms,
            ..Default::default()
        }
    }

    /// Load from a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
