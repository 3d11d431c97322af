//! Component detections and the geometry shared by the detection stages.
//!
//! Detectors report boxes as centre + size. `RawDetection` carries
//! tile-local coordinates straight from the detector; `Detection` carries
//! full-image coordinates after reprojection.

pub mod hosted;
pub mod merge;
pub mod nms;
pub mod pipeline;
pub mod provider;
pub mod tiles;

pub use hosted::{HostedDetector, HostedDetectorConfig};
pub use merge::{merge_tile_detections, reproject};
pub use nms::NmsReducer;
pub use pipeline::{detect_components, DetectionOutcome};
pub use provider::{Detector, DetectorError};
pub use tiles::{Tile, TileSlicer};

use serde::{Deserialize, Deserializer, Serialize};

/// Largest centre coordinate or extent accepted as a real pixel box.
pub const MAX_COORDINATE: f64 = 16_777_216.0;

/// Axis-aligned box in centre form: `(x, y)` is the centre.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Corner form of a [`BoundingBox`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn corners(&self) -> Corners {
        Corners {
            x1: self.x - self.width / 2.0,
            y1: self.y - self.height / 2.0,
            x2: self.x + self.width / 2.0,
            y2: self.y + self.height / 2.0,
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// True unless the box has a strictly positive extent and every field
    /// lies within `MAX_COORDINATE`. Non-finite values are degenerate.
    pub fn is_degenerate(&self) -> bool {
        let in_range = |v: f64| v.abs() <= MAX_COORDINATE;
        !(in_range(self.x)
            && in_range(self.y)
            && in_range(self.width)
            && in_range(self.height)
            && self.width > 0.0
            && self.height > 0.0)
    }

    /// Euclidean distance between the two centres.
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Intersection over union. Zero for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        if self.is_degenerate() || other.is_degenerate() {
            return 0.0;
        }

        let a = self.corners();
        let b = other.corners();

        let x_left = a.x1.max(b.x1);
        let y_top = a.y1.max(b.y1);
        let x_right = a.x2.min(b.x2);
        let y_bottom = a.y2.min(b.y2);

        if x_right <= x_left || y_bottom <= y_top {
            return 0.0;
        }

        let intersection = (x_right - x_left) * (y_bottom - y_top);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }

        (intersection / union).clamp(0.0, 1.0)
    }
}

fn default_class() -> String {
    "Unknown".to_string()
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().unwrap_or(0.0))
}

/// One prediction as returned by the detector for a single tile.
///
/// Missing, null or non-numeric fields decode as zero rather than failing
/// the whole response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(rename = "class", default = "default_class")]
    pub class_name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub width: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub height: f64,
}

impl RawDetection {
    pub fn new(
        class_name: impl Into<String>,
        confidence: f64,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            x,
            y,
            width,
            height,
        }
    }
}

/// A detection in full-image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    pub fn iou(&self, other: &Detection) -> f64 {
        self.bbox.iou(&other.bbox)
    }
}

/// Detector response body: `{ "predictions": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionSet {
    #[serde(default)]
    pub predictions: Vec<RawDetection>,
}
