//! pcbtrace - netlist inference from photographs of printed circuit boards
//!
//! Components are found by a pluggable object detector run over
//! overlapping tiles. Copper tracks are segmented by colour, and two
//! components are linked when both touch copper, sit close together, and
//! the board between them is mostly track.
//!
//! # Quick Start
//!
//! ```no_run
//! use pcbtrace::{PcbTraceCore, PipelineConfig, NoTextReader, load_rgb_image, load_detections};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), pcbtrace::PcbTraceError> {
//! let image = load_rgb_image(Path::new("board.jpg"))?;
//! let detections = load_detections(Path::new("predictions.json"))?;
//! let result = PcbTraceCore::analyze_with_detections(
//!     image,
//!     detections,
//!     &NoTextReader,
//!     &PipelineConfig::default(),
//! )
//! .await?;
//!
//! for line in result.netlist() {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Stages
//!
//! - **Detection**: tile planning, per-tile inference, reprojection, NMS
//! - **Tracks**: HSV substrate mask, morphology, perimeter overlap sampling
//! - **Circuit**: pairwise connectivity, graph, netlist report

pub mod annotate;
pub mod circuit;
pub mod config;
pub mod core;
pub mod detection;
pub mod naming;
pub mod ocr;
pub mod tracks;

// Re-export main types
pub use circuit::{
    build_circuit_graph, netlist_report, AnalysisSummary, CircuitGraph, Component,
    ConnectivityAnalyzer, GraphError,
};
pub use config::{ColorProfile, PipelineConfig};
pub use crate::core::{
    load_detections, load_rgb_image, AnalysisReport, AnalysisResult, AnalysisStats, ArtifactPaths,
    PcbTraceCore, PcbTraceError,
};
pub use detection::{
    BoundingBox, Detection, Detector, DetectorError, HostedDetector, HostedDetectorConfig,
    NmsReducer, RawDetection, Tile, TileSlicer,
};
pub use naming::NamingContext;
pub use ocr::{NoTextReader, OcrError, TextReader};
pub use tracks::{BinaryTrackMask, OverlapSampler, TrackMaskExtractor};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        AnalysisResult, BoundingBox, CircuitGraph, Component, Detection, Detector, NoTextReader,
        PcbTraceCore, PcbTraceError, PipelineConfig, RawDetection, TextReader,
    };
}
