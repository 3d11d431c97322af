//! Pipeline configuration.
//!
//! Every heuristic threshold lives here with its calibrated default. A JSON
//! file may override any subset of fields; missing fields keep their
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::PcbTraceError;
use crate::tracks::HsvRange;

/// Top-level configuration for one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub slicing: SlicingConfig,
    pub nms: NmsConfig,
    pub tracks: TrackMaskConfig,
    pub overlap: OverlapConfig,
    pub connectivity: ConnectivityConfig,
    pub inference: InferenceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicingConfig {
    /// Allow tiled inference at all.
    pub enabled: bool,
    /// Edge length of a square tile, in pixels.
    pub tile_size: u32,
    /// Fraction of a tile shared with its neighbour, in `[0, 1)`.
    pub overlap_ratio: f64,
    /// Images with both sides at or below this size are not sliced.
    pub slice_threshold: u32,
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tile_size: 640,
            overlap_ratio: 0.2,
            slice_threshold: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NmsConfig {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    /// Also run NMS on each tile's output before merging.
    pub per_tile: bool,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.4,
            per_tile: false,
        }
    }
}

/// Substrate colour to segment away from the copper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ColorProfile {
    /// Green solder mask.
    #[default]
    Green,
    /// Copper or gold coloured boards.
    Copper,
    /// Explicit HSV bounds, OpenCV scale (H 0-179, S/V 0-255).
    Custom { lower: [u8; 3], upper: [u8; 3] },
}

impl ColorProfile {
    pub fn range(&self) -> HsvRange {
        match *self {
            ColorProfile::Green => HsvRange::new([35, 40, 40], [85, 255, 255]),
            ColorProfile::Copper => HsvRange::new([10, 50, 50], [30, 255, 255]),
            ColorProfile::Custom { lower, upper } => HsvRange::new(lower, upper),
        }
    }
}

impl std::str::FromStr for ColorProfile {
    type Err = PcbTraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "green" => Ok(ColorProfile::Green),
            "copper" | "gold" => Ok(ColorProfile::Copper),
            other => Err(PcbTraceError::Config(format!(
                "unknown color profile '{}', expected green or copper",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    /// Side of the square structuring element; odd.
    pub kernel_size: u32,
    pub open_iterations: u32,
    pub close_iterations: u32,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            open_iterations: 2,
            close_iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMaskConfig {
    pub profile: ColorProfile,
    pub morphology: MorphologyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlapConfig {
    pub samples_per_edge: u32,
    /// Half-size of the square neighbourhood probed around each sample.
    pub margin: u32,
    pub min_hit_ratio: f64,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            samples_per_edge: 12,
            margin: 5,
            min_hit_ratio: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Centre-to-centre distance below which a pair is considered, in pixels.
    pub max_distance: f64,
    /// Padding around the centre-to-centre segment for the continuity region.
    pub continuity_margin: u32,
    /// Track fraction the continuity region must exceed.
    pub density_threshold: f64,
    /// Component count from which the pair pass runs on the rayon pool.
    pub parallel_min_components: usize,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            max_distance: 140.0,
            continuity_margin: 25,
            density_threshold: 0.40,
            parallel_min_components: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Upper bound on tile inference calls in flight for one run.
    pub max_concurrent_tiles: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tiles: 4,
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, PcbTraceError> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            PcbTraceError::Config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Reject values the pipeline cannot act on.
    pub fn validate(&self) -> Result<(), PcbTraceError> {
        let fail = |msg: String| Err(PcbTraceError::Config(msg));

        if self.slicing.tile_size == 0 {
            return fail("slicing.tile_size must be positive".into());
        }
        if !(0.0..1.0).contains(&self.slicing.overlap_ratio) {
            return fail(format!(
                "slicing.overlap_ratio must be in [0, 1), got {}",
                self.slicing.overlap_ratio
            ));
        }
        if !unit_interval(self.nms.confidence_threshold) {
            return fail(format!(
                "nms.confidence_threshold must be in [0, 1], got {}",
                self.nms.confidence_threshold
            ));
        }
        if !unit_interval(self.nms.iou_threshold) {
            return fail(format!(
                "nms.iou_threshold must be in [0, 1], got {}",
                self.nms.iou_threshold
            ));
        }
        let morph = &self.tracks.morphology;
        if morph.kernel_size == 0 || morph.kernel_size % 2 == 0 {
            return fail(format!(
                "tracks.morphology.kernel_size must be odd, got {}",
                morph.kernel_size
            ));
        }
        let range = self.tracks.profile.range();
        if range.lower.iter().zip(range.upper.iter()).any(|(lo, hi)| lo > hi) {
            return fail("tracks.profile lower bound exceeds upper bound".into());
        }
        if self.overlap.samples_per_edge == 0 {
            return fail("overlap.samples_per_edge must be positive".into());
        }
        if !unit_interval(self.overlap.min_hit_ratio) {
            return fail(format!(
                "overlap.min_hit_ratio must be in [0, 1], got {}",
                self.overlap.min_hit_ratio
            ));
        }
        if !(self.connectivity.max_distance.is_finite() && self.connectivity.max_distance >= 0.0)
        {
            return fail("connectivity.max_distance must be a non-negative number".into());
        }
        if !unit_interval(self.connectivity.density_threshold) {
            return fail(format!(
                "connectivity.density_threshold must be in [0, 1], got {}",
                self.connectivity.density_threshold
            ));
        }
        if self.inference.max_concurrent_tiles == 0 {
            return fail("inference.max_concurrent_tiles must be positive".into());
        }
        Ok(())
    }
}

fn unit_interval(v: f64) -> bool {
    (0.0..=1.0).contains(&v)
}
