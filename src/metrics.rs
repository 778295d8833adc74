//! Engine counters
//!
//! Operational visibility for the aggregation path: what came in, what was
//! routed, what was dropped, and how often stored state failed to decode.

use std::collections::HashMap;

/// Counters collected by an [`AggregationEngine`](crate::engine::AggregationEngine)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineMetrics {
    /// Measurements handed to the engine
    pub measurements_received: u64,
    /// (parent, measurement) pairs produced by fan-out
    pub pairs_routed: u64,
    /// Measurements dropped because their sensor is unknown
    pub unknown_sensor_drops: u64,
    /// Aggregated records emitted downstream
    pub records_emitted: u64,
    /// State blobs that failed to decode
    pub decode_failures: u64,
    /// Sensors whose cached parent set changed
    pub parent_set_changes: u64,
    /// Drops per unknown identifier
    pub drops_by_identifier: HashMap<String, u64>,
}

impl EngineMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an unknown-sensor drop, returning how often this identifier
    /// has now been dropped
    pub fn record_drop(&mut self, identifier: &str) -> u64 {
        self.unknown_sensor_drops += 1;
        let count = self
            .drops_by_identifier
            .entry(identifier.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Average fan-out per routed measurement
    pub fn fanout_ratio(&self) -> f64 {
        let routed = self
            .measurements_received
            .saturating_sub(self.unknown_sensor_drops);
        if routed == 0 {
            return 0.0;
        }
        self.pairs_routed as f64 / routed as f64
    }

    /// Fold another worker's counters into this one
    pub fn merge(&mut self, other: &EngineMetrics) {
        self.measurements_received += other.measurements_received;
        self.pairs_routed += other.pairs_routed;
        self.unknown_sensor_drops += other.unknown_sensor_drops;
        self.records_emitted += other.records_emitted;
        self.decode_failures += other.decode_failures;
        self.parent_set_changes += other.parent_set_changes;
        for (id, count) in &other.drops_by_identifier {
            *self.drops_by_identifier.entry(id.clone()).or_insert(0) += count;
        }
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a human-readable report
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Rollup Engine Metrics ===\n\n");
        report.push_str(&format!(
            "Measurements received: {}\n",
            self.measurements_received
        ));
        report.push_str(&format!("Pairs routed: {}\n", self.pairs_routed));
        report.push_str(&format!("Fan-out ratio: {:.2}\n", self.fanout_ratio()));
        report.push_str(&format!("Records emitted: {}\n", self.records_emitted));
        report.push_str(&format!("Decode failures: {}\n", self.decode_failures));
        report.push_str(&format!(
            "Parent set changes: {}\n",
            self.parent_set_changes
        ));
        report.push_str(&format!(
            "Unknown sensor drops: {}\n",
            self.unknown_sensor_drops
        ));

        let mut drops: Vec<_> = self.drops_by_identifier.iter().collect();
        drops.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (id, count) in drops {
            report.push_str(&format!("  {}: {}\n", id, count));
        }

        report
    }
}
