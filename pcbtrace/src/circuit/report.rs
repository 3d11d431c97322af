//! Netlist report rendering.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{CircuitGraph, Component};

const RULE_WIDTH: usize = 50;

/// Plain-text netlist report: component table, connection list, totals.
pub fn netlist_report(graph: &CircuitGraph) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out, "PCB REVERSE ENGINEERING - NETLIST REPORT");
    let _ = writeln!(out, "{}", heavy);
    let _ = writeln!(out);

    let _ = writeln!(out, "COMPONENTS:");
    let _ = writeln!(out, "{}", light);
    for component in graph.components() {
        let _ = writeln!(out, "{:<10} | {:<20}", component.id, component.component_type);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "CONNECTIONS (Netlist):");
    let _ = writeln!(out, "{}", light);
    for connection in graph.connections() {
        let _ = writeln!(out, "{}", connection);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Total Components: {}", graph.component_count());
    let _ = writeln!(out, "Total Connections: {}", graph.connection_count());
    out
}

pub fn write_netlist_report(graph: &CircuitGraph, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, netlist_report(graph))?;
    tracing::info!("Netlist report saved to {}", path.display());
    Ok(())
}

/// Integer pixel box as reported to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    /// Rounded to three decimals.
    pub confidence: f64,
    pub bbox: PixelBox,
}

impl From<&Component> for ComponentSummary {
    fn from(c: &Component) -> Self {
        Self {
            id: c.id.clone(),
            component_type: c.component_type.clone(),
            confidence: (c.confidence * 1000.0).round() / 1000.0,
            bbox: PixelBox {
                x: c.bbox.x as i64,
                y: c.bbox.y as i64,
                width: c.bbox.width as i64,
                height: c.bbox.height as i64,
            },
        }
    }
}

/// Serializable view of a finished graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub components: Vec<ComponentSummary>,
    pub component_count: usize,
    pub netlist: Vec<String>,
    pub connection_count: usize,
}

impl AnalysisSummary {
    pub fn from_graph(graph: &CircuitGraph) -> Self {
        let components: Vec<ComponentSummary> = graph.components().map(ComponentSummary::from).collect();
        let netlist = graph.get_netlist();
        Self {
            component_count: components.len(),
            connection_count: netlist.len(),
            components,
            netlist,
        }
    }
}
