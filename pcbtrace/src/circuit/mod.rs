//! Circuit model inferred from a board photo: components as nodes,
//! track connections as undirected edges.

pub mod connectivity;
pub mod graph;
pub mod report;

pub use connectivity::{build_circuit_graph, ConnectivityAnalyzer};
pub use graph::{CircuitGraph, Connection, GraphError};
pub use report::{netlist_report, write_netlist_report, AnalysisSummary, ComponentSummary, PixelBox};

use serde::{Deserialize, Serialize};

use crate::detection::BoundingBox;

/// A named circuit element located on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique within one analysis run: OCR text or a generated label.
    pub id: String,
    /// Detector class, e.g. "Resistor".
    pub component_type: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Component {
    pub fn new(id: impl Into<String>, component_type: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            id: id.into(),
            component_type: component_type.into(),
            confidence: 1.0,
            bbox,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}
