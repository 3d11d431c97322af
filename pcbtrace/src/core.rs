//! Analysis entry points shared by the CLI and library callers.
//! Every run owns its image, mask, naming context and graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotate::annotate;
use crate::circuit::{
    build_circuit_graph, write_netlist_report, AnalysisSummary, CircuitGraph, Component,
    ConnectivityAnalyzer, GraphError,
};
use crate::config::PipelineConfig;
use crate::detection::pipeline::merge_tiles;
use crate::detection::{detect_components, DetectionOutcome, Detector, RawDetection, Tile};
use crate::naming::{name_components, NamingContext};
use crate::ocr::TextReader;
use crate::tracks::{BinaryTrackMask, OverlapSampler, TrackMaskExtractor};

pub const NO_COMPONENTS_MESSAGE: &str = "No components detected in the image";

#[derive(Debug, thiserror::Error)]
pub enum PcbTraceError {
    #[error("Image load error: {0}")]
    ImageLoad(String),
    #[error("Image write error: {0}")]
    ImageWrite(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for PcbTraceError {
    fn from(e: serde_json::Error) -> Self {
        PcbTraceError::Other(format!("JSON error: {}", e))
    }
}

/// Decode an image file into 8-bit RGB.
pub fn load_rgb_image(path: &Path) -> Result<RgbImage, PcbTraceError> {
    let image = image::open(path)
        .map_err(|e| PcbTraceError::ImageLoad(format!("{}: {}", path.display(), e)))?;
    Ok(image.to_rgb8())
}

/// Read a saved detector response (`{"predictions": [...]}` or a bare array).
pub fn load_detections(path: &Path) -> Result<Vec<RawDetection>, PcbTraceError> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    let predictions = match value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(mut map) => map
            .remove("predictions")
            .unwrap_or(serde_json::Value::Array(Vec::new())),
        _ => {
            return Err(PcbTraceError::Other(format!(
                "{}: expected a predictions object or array",
                path.display()
            )))
        }
    };
    Ok(serde_json::from_value(predictions)?)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStats {
    pub tiles: usize,
    pub failed_tiles: usize,
    pub raw_detections: usize,
    pub components: usize,
    pub connections: usize,
    /// Fraction of image pixels classified as track.
    pub track_coverage: f64,
}

/// Everything produced by one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: Option<PathBuf>,
    pub image: Arc<RgbImage>,
    pub mask: BinaryTrackMask,
    pub graph: CircuitGraph,
    pub stats: AnalysisStats,
    pub warnings: Vec<String>,
}

/// JSON document describing a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub success: bool,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub summary: AnalysisSummary,
    pub stats: AnalysisStats,
    pub warnings: Vec<String>,
}

/// Files written by [`AnalysisResult::write_artifacts`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub netlist: PathBuf,
    pub tracks: PathBuf,
    pub annotated: PathBuf,
    pub analysis: PathBuf,
}

impl AnalysisResult {
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.graph.components()
    }

    pub fn netlist(&self) -> Vec<String> {
        self.graph.get_netlist()
    }

    pub fn has_components(&self) -> bool {
        self.graph.component_count() > 0
    }

    pub fn report(&self) -> AnalysisReport {
        AnalysisReport {
            success: true,
            run_id: self.run_id,
            timestamp: self.timestamp,
            message: (!self.has_components()).then(|| NO_COMPONENTS_MESSAGE.to_string()),
            summary: AnalysisSummary::from_graph(&self.graph),
            stats: self.stats.clone(),
            warnings: self.warnings.clone(),
        }
    }

    /// File-name stamp: UTC time plus the first 8 hex digits of the run id.
    pub fn stamp(&self) -> String {
        let id = self.run_id.simple().to_string();
        format!("{}_{}", self.timestamp.format("%Y%m%d_%H%M%S"), &id[..8])
    }

    /// Write the netlist report, track mask, annotated photo and JSON
    /// report into `out_dir`, creating it if needed.
    pub fn write_artifacts(&self, out_dir: &Path) -> Result<ArtifactPaths, PcbTraceError> {
        std::fs::create_dir_all(out_dir)?;
        let stamp = self.stamp();
        let paths = ArtifactPaths {
            netlist: out_dir.join(format!("netlist_{}.txt", stamp)),
            tracks: out_dir.join(format!("tracks_{}.png", stamp)),
            annotated: out_dir.join(format!("annotated_{}.png", stamp)),
            analysis: out_dir.join(format!("analysis_{}.json", stamp)),
        };

        write_netlist_report(&self.graph, &paths.netlist)?;
        self.mask.save(&paths.tracks)?;

        let components: Vec<Component> = self.components().cloned().collect();
        annotate(&self.image, &components)
            .save(&paths.annotated)
            .map_err(|e| PcbTraceError::ImageWrite(format!("{}: {}", paths.annotated.display(), e)))?;

        let json = serde_json::to_string_pretty(&self.report())?;
        std::fs::write(&paths.analysis, json)?;

        tracing::info!("Artifacts written to {}", out_dir.display());
        Ok(paths)
    }
}

/// Pipeline entry points.
pub struct PcbTraceCore;

impl PcbTraceCore {
    /// Load `path` and run the full pipeline.
    pub async fn analyze(
        path: &Path,
        detector: Arc<dyn Detector>,
        reader: &dyn TextReader,
        config: &PipelineConfig,
    ) -> Result<AnalysisResult, PcbTraceError> {
        let image = load_rgb_image(path)?;
        tracing::info!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
        let mut result = Self::analyze_image(image, detector, reader, config).await?;
        result.source = Some(path.to_path_buf());
        Ok(result)
    }

    /// Run the full pipeline on a decoded image. Track extraction runs on
    /// the blocking pool while tiles are being inferred.
    pub async fn analyze_image(
        image: RgbImage,
        detector: Arc<dyn Detector>,
        reader: &dyn TextReader,
        config: &PipelineConfig,
    ) -> Result<AnalysisResult, PcbTraceError> {
        config.validate()?;
        let image = Arc::new(image);

        let extractor = TrackMaskExtractor::from_config(&config.tracks);
        let mask_source = Arc::clone(&image);
        let mask_task = tokio::task::spawn_blocking(move || extractor.extract(&mask_source));

        let outcome = detect_components(Arc::clone(&image), detector, config).await;
        let mask = mask_task
            .await
            .map_err(|e| PcbTraceError::Other(format!("track extraction task failed: {}", e)))?;

        Self::assemble(image, outcome, mask, reader, config).await
    }

    /// Run everything after inference on detections already expressed in
    /// full-image coordinates, such as a saved detector response.
    pub async fn analyze_with_detections(
        image: RgbImage,
        raw: Vec<RawDetection>,
        reader: &dyn TextReader,
        config: &PipelineConfig,
    ) -> Result<AnalysisResult, PcbTraceError> {
        config.validate()?;
        let tile = Tile::whole(image.width(), image.height());
        let raw_count = raw.len();
        let outcome = DetectionOutcome {
            detections: merge_tiles(&[(tile, raw)], &config.nms),
            tiles: vec![tile],
            failed_tiles: 0,
            raw_count,
            warnings: Vec::new(),
        };
        let mask = TrackMaskExtractor::from_config(&config.tracks).extract(&image);
        Self::assemble(Arc::new(image), outcome, mask, reader, config).await
    }

    async fn assemble(
        image: Arc<RgbImage>,
        outcome: DetectionOutcome,
        mask: BinaryTrackMask,
        reader: &dyn TextReader,
        config: &PipelineConfig,
    ) -> Result<AnalysisResult, PcbTraceError> {
        let mut warnings = outcome.warnings;
        if outcome.detections.is_empty() {
            tracing::warn!("{}", NO_COMPONENTS_MESSAGE);
            warnings.push(NO_COMPONENTS_MESSAGE.to_string());
        }

        let mut naming = NamingContext::new();
        let components = name_components(&image, &outcome.detections, reader, &mut naming).await;

        let analyzer = ConnectivityAnalyzer::new(
            OverlapSampler::from_config(&config.overlap),
            config.connectivity.clone(),
        );
        let graph = build_circuit_graph(components, &mask, &analyzer)?;

        let stats = AnalysisStats {
            tiles: outcome.tiles.len(),
            failed_tiles: outcome.failed_tiles,
            raw_detections: outcome.raw_count,
            components: graph.component_count(),
            connections: graph.connection_count(),
            track_coverage: mask.coverage(),
        };

        Ok(AnalysisResult {
            run_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: None,
            image,
            mask,
            graph,
            stats,
            warnings,
        })
    }
}
