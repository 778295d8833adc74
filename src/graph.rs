// Sensor Rollup - Hierarchical power aggregation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sensor hierarchy
//!
//! The hierarchy is a DAG: a sensor may have any number of direct parents.
//! It is loaded once and shared read-only by every router.

use std::collections::{BTreeSet, HashMap};

/// Unique identifier for a sensor
pub type SensorId = String;

/// A sensor and its direct parents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorNode {
    /// Sensor identifier
    pub identifier: SensorId,
    /// Direct parent identifiers
    pub parents: BTreeSet<SensorId>,
}

impl SensorNode {
    /// Create a node with no parents (a root)
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            parents: BTreeSet::new(),
        }
    }

    /// Create a node with the given parents
    pub fn with_parents<I, S>(identifier: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifier: identifier.into(),
            parents: parents.into_iter().map(Into::into).collect(),
        }
    }
}

/// Read-only parent lookup over the sensor hierarchy
pub trait SensorGraph: Send + Sync {
    /// Direct parents of `identifier`, or `None` if the sensor is unknown
    fn parents(&self, identifier: &str) -> Option<&BTreeSet<SensorId>>;

    /// Whether `identifier` is known
    fn contains(&self, identifier: &str) -> bool {
        self.parents(identifier).is_some()
    }
}

/// Adjacency-map implementation of [`SensorGraph`]
#[derive(Debug, Clone, Default)]
pub struct SensorRegistry {
    nodes: HashMap<SensorId, SensorNode>,
}

impl SensorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from nodes
    ///
    /// Parents that are not themselves listed are added as root nodes, so
    /// every identifier reachable in the hierarchy is known.
    pub fn from_nodes(nodes: impl IntoIterator<Item = SensorNode>) -> Self {
        let mut registry = Self::new();
        for node in nodes {
            registry.insert(node);
        }
        registry
    }

    /// Build a registry from `(child, parent)` edges
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut registry = Self::new();
        for (child, parent) in edges {
            registry.add_edge(child, parent);
        }
        registry
    }

    /// Add or merge a node
    pub fn insert(&mut self, node: SensorNode) {
        for parent in &node.parents {
            self.nodes
                .entry(parent.clone())
                .or_insert_with(|| SensorNode::new(parent.clone()));
        }
        self.nodes
            .entry(node.identifier.clone())
            .or_insert_with(|| SensorNode::new(node.identifier.clone()))
            .parents
            .extend(node.parents);
    }

    /// Add a single child → parent edge
    pub fn add_edge(&mut self, child: &str, parent: &str) {
        self.insert(SensorNode::with_parents(child, [parent]));
    }

    /// Get a node
    pub fn get(&self, identifier: &str) -> Option<&SensorNode> {
        self.nodes.get(identifier)
    }

    /// Number of known sensors
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sensors that are parents of at least one other sensor
    pub fn aggregate_nodes(&self) -> BTreeSet<&str> {
        self.nodes
            .values()
            .flat_map(|n| n.parents.iter().map(String::as_str))
            .collect()
    }
}

impl SensorGraph for SensorRegistry {
    fn parents(&self, identifier: &str) -> Option<&BTreeSet<SensorId>> {
        self.nodes.get(identifier).map(|n| &n.parents)
    }
}
