//! Fan-out routing
//!
//! Maps one measurement to one `(parent, measurement)` pair per **direct**
//! parent of its sensor. Grandparents are not reached: a measurement only
//! feeds the aggregates immediately above it.

use std::sync::Arc;

use crate::graph::{SensorGraph, SensorId};
use crate::record::Measurement;

/// Result of routing one measurement
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Sensor is known; one pair per direct parent (possibly none for a root)
    Routed(Vec<(SensorId, Measurement)>),
    /// Sensor is not in the hierarchy; the measurement is dropped
    UnknownSensor,
}

impl RouteOutcome {
    /// Routed pairs, empty for an unknown sensor
    pub fn into_pairs(self) -> Vec<(SensorId, Measurement)> {
        match self {
            RouteOutcome::Routed(pairs) => pairs,
            RouteOutcome::UnknownSensor => Vec::new(),
        }
    }

    /// Check if the measurement was dropped
    pub fn is_dropped(&self) -> bool {
        matches!(self, RouteOutcome::UnknownSensor)
    }
}

/// Routes measurements to the aggregate keys they affect
#[derive(Clone)]
pub struct FanoutRouter {
    graph: Arc<dyn SensorGraph>,
}

impl std::fmt::Debug for FanoutRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutRouter").finish_non_exhaustive()
    }
}

impl FanoutRouter {
    /// Create a router over a shared hierarchy
    pub fn new(graph: Arc<dyn SensorGraph>) -> Self {
        Self { graph }
    }

    /// The hierarchy this router reads
    pub fn graph(&self) -> &dyn SensorGraph {
        self.graph.as_ref()
    }

    /// Route a measurement, reporting unknown sensors explicitly
    pub fn route_outcome(&self, measurement: &Measurement) -> RouteOutcome {
        match self.graph.parents(&measurement.identifier) {
            Some(parents) => RouteOutcome::Routed(
                parents
                    .iter()
                    .map(|parent| (parent.clone(), measurement.clone()))
                    .collect(),
            ),
            None => RouteOutcome::UnknownSensor,
        }
    }

    /// Route a measurement; unknown sensors yield no pairs
    pub fn route(&self, measurement: &Measurement) -> Vec<(SensorId, Measurement)> {
        self.route_outcome(measurement).into_pairs()
    }
}
