//! Record definitions
//!
//! This module defines the records that cross the core's boundary:
//! - [`Measurement`]: one reading from a sensor (the input record)
//! - [`AggregatedRecord`]: a snapshot of an aggregate node (the output and
//!   persisted record)
//!
//! Both serialize to the JSON wire shape
//! `{identifier, timestamp, value}` and
//! `{identifier, timestamp, min, max, count, sum, average}` respectively.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, RollupError};

/// Milliseconds since the Unix epoch
pub type Timestamp = i64;

/// A single power reading from a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Identifier of the sensor that produced the reading
    pub identifier: String,
    /// Milliseconds since epoch
    pub timestamp: Timestamp,
    /// Measured active power in Watts
    pub value: f64,
}

impl Measurement {
    /// Create a new measurement
    pub fn new(identifier: impl Into<String>, timestamp: Timestamp, value: f64) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
            value,
        }
    }

    /// Parse a measurement from its JSON wire form
    pub fn from_json(json: &str) -> Result<Self, RollupError> {
        serde_json::from_str(json).map_err(|e| DecodeError::from(e).into())
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> String {
        // Plain struct of strings and numbers: serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Snapshot of an aggregate node's statistics
///
/// Produced once per state update and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    /// Identifier of the aggregate node
    pub identifier: String,
    /// Timestamp of the update that produced this snapshot
    pub timestamp: Timestamp,
    /// Smallest value observed
    pub min: f64,
    /// Largest value observed
    pub max: f64,
    /// Number of measurements folded in
    pub count: u64,
    /// Sum of all measured values
    pub sum: f64,
    /// `sum / count`, absent when `count == 0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl AggregatedRecord {
    /// Whether this snapshot is a zero-count tombstone
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Parse a record from its JSON form
    pub fn from_json(json: &str) -> Result<Self, RollupError> {
        serde_json::from_str(json).map_err(|e| DecodeError::from(e).into())
    }

    /// Serialize to the JSON form
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Timestamp as a UTC date-time
    #[cfg(feature = "timestamps")]
    pub fn datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        chrono::DateTime::from_timestamp_millis(self.timestamp)
    }
}
