//! Circuit graph backed by petgraph.

use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Component;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Component '{0}' already exists")]
    DuplicateComponent(String),
    #[error("Unknown component '{0}'")]
    UnknownComponent(String),
}

/// An undirected connection, stored in the order it was first added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -- {}", self.from, self.to)
    }
}

/// Components as nodes, track connections as undirected edges.
///
/// No self-loops; each unordered pair is stored at most once.
#[derive(Debug, Clone, Default)]
pub struct CircuitGraph {
    graph: UnGraph<Component, ()>,
    indices: HashMap<String, NodeIndex>,
    connections: Vec<Connection>,
}

impl CircuitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component node. Identifiers must be unique.
    pub fn add_component(&mut self, component: Component) -> Result<NodeIndex, GraphError> {
        if self.indices.contains_key(&component.id) {
            return Err(GraphError::DuplicateComponent(component.id));
        }
        let id = component.id.clone();
        tracing::debug!("Added component node: {} ({})", id, component.component_type);
        let idx = self.graph.add_node(component);
        self.indices.insert(id, idx);
        Ok(idx)
    }

    /// Connect two components.
    ///
    /// Returns `Ok(true)` if a new edge was inserted, `Ok(false)` for a
    /// self-connection or an edge that already exists in either direction.
    pub fn add_connection(&mut self, id1: &str, id2: &str) -> Result<bool, GraphError> {
        let a = self.index_of(id1)?;
        let b = self.index_of(id2)?;
        if a == b || self.graph.contains_edge(a, b) {
            return Ok(false);
        }
        self.graph.add_edge(a, b, ());
        let connection = Connection {
            from: id1.to_string(),
            to: id2.to_string(),
        };
        tracing::debug!("Added connection: {}", connection);
        self.connections.push(connection);
        Ok(true)
    }

    fn index_of(&self, id: &str) -> Result<NodeIndex, GraphError> {
        self.indices
            .get(id)
            .copied()
            .ok_or_else(|| GraphError::UnknownComponent(id.to_string()))
    }

    pub fn get_component(&self, id: &str) -> Option<&Component> {
        self.indices
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Components in insertion order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.graph.node_weights()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Connections as `"id1 -- id2"` strings, in insertion order.
    pub fn get_netlist(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.to_string()).collect()
    }

    pub fn is_connected(&self, id1: &str, id2: &str) -> bool {
        match (self.indices.get(id1), self.indices.get(id2)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Identifiers of components directly connected to `id`.
    pub fn neighbors(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.indices.get(id) else {
            return Vec::new();
        };
        self.graph
            .neighbors(idx)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|c| c.id.as_str())
            .collect()
    }

    pub fn component_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Read access to the underlying petgraph graph.
    pub fn graph(&self) -> &UnGraph<Component, ()> {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn graph_with(ids: &[&str]) -> CircuitGraph {
        let mut g = CircuitGraph::new();
        for id in ids {
            g.add_component(Component::new(*id, "Resistor", BoundingBox::new(0.0, 0.0, 1.0, 1.0)))
                .unwrap();
        }
        g
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let mut g = graph_with(&["R1"]);
        let err = g
            .add_component(Component::new("R1", "Resistor", BoundingBox::default()))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateComponent("R1".to_string()));
        assert_eq!(g.component_count(), 1);
    }

    #[test]
    fn test_connection_is_idempotent() {
        let mut g = graph_with(&["R1", "U1"]);
        assert_eq!(g.add_connection("R1", "U1"), Ok(true));
        assert_eq!(g.add_connection("R1", "U1"), Ok(false));
        assert_eq!(g.add_connection("U1", "R1"), Ok(false));
        assert_eq!(g.connection_count(), 1);
        assert_eq!(g.graph().edge_count(), 1);
    }

    #[test]
    fn test_self_loop_ignored() {
        let mut g = graph_with(&["C1"]);
        assert_eq!(g.add_connection("C1", "C1"), Ok(false));
        assert_eq!(g.connection_count(), 0);
    }

    #[test]
    fn test_unknown_component() {
        let mut g = graph_with(&["R1"]);
        assert_eq!(
            g.add_connection("R1", "Q9"),
            Err(GraphError::UnknownComponent("Q9".to_string()))
        );
    }

    #[test]
    fn test_netlist_insertion_order() {
        let mut g = graph_with(&["R1", "U1", "C1"]);
        g.add_connection("U1", "C1").unwrap();
        g.add_connection("R1", "U1").unwrap();
        assert_eq!(g.get_netlist(), vec!["U1 -- C1", "R1 -- U1"]);
        assert!(g.is_connected("C1", "U1"));
        let mut n = g.neighbors("U1");
        n.sort();
        assert_eq!(n, vec!["C1", "R1"]);
    }

    #[test]
    fn test_components_in_insertion_order() {
        let g = graph_with(&["U1", "R1", "C1"]);
        let ids: Vec<_> = g.components().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["U1", "R1", "C1"]);
        assert!(g.get_component("R1").is_some());
        assert!(g.get_component("R2").is_none());
    }
}
