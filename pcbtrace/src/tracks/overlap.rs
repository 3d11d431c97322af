//! Does a component footprint touch copper?
//!
//! Samples evenly spaced points on the four edges of the bounding box and
//! probes a small neighbourhood around each. A component touches a track
//! when enough of the samples hit, which keeps isolated mask noise from
//! counting as a connection.

use crate::config::OverlapConfig;
use crate::detection::BoundingBox;

use super::{BinaryTrackMask, PixelRect};

#[derive(Debug, Clone, Copy)]
pub struct OverlapSampler {
    pub samples_per_edge: u32,
    pub margin: u32,
    pub min_hit_ratio: f64,
}

impl Default for OverlapSampler {
    fn default() -> Self {
        Self::from_config(&OverlapConfig::default())
    }
}

impl OverlapSampler {
    pub fn from_config(config: &OverlapConfig) -> Self {
        Self {
            samples_per_edge: config.samples_per_edge,
            margin: config.margin,
            min_hit_ratio: config.min_hit_ratio,
        }
    }

    /// Perimeter sample points: top, bottom, left, right edge in that order.
    pub fn sample_points(&self, bbox: &BoundingBox) -> Vec<(i64, i64)> {
        let n = self.samples_per_edge as i64;
        if n == 0 || bbox.is_degenerate() {
            return Vec::new();
        }

        let cx = bbox.x as i64;
        let cy = bbox.y as i64;
        let half_w = bbox.width as i64 / 2;
        let half_h = bbox.height as i64 / 2;
        let (x1, y1, x2, y2) = (cx - half_w, cy - half_h, cx + half_w, cy + half_h);

        let along = |start: i64, end: i64, i: i64| start + ((end - start) * i).div_euclid(n);

        let mut points = Vec::with_capacity(4 * n as usize);
        points.extend((0..n).map(|i| (along(x1, x2, i), y1)));
        points.extend((0..n).map(|i| (along(x1, x2, i), y2)));
        points.extend((0..n).map(|i| (x1, along(y1, y2, i))));
        points.extend((0..n).map(|i| (x2, along(y1, y2, i))));
        points
    }

    /// Fraction of perimeter samples with track pixels nearby.
    pub fn hit_ratio(&self, mask: &BinaryTrackMask, bbox: &BoundingBox) -> f64 {
        let points = self.sample_points(bbox);
        if points.is_empty() {
            return 0.0;
        }
        let margin = self.margin as i64;
        let hits = points
            .iter()
            .filter(|&&(x, y)| mask.any_track_in(PixelRect::around(x, y, margin)))
            .count();
        hits as f64 / points.len() as f64
    }

    /// True when the hit ratio reaches `min_hit_ratio`. Degenerate boxes
    /// never touch.
    pub fn touches_track(&self, mask: &BinaryTrackMask, bbox: &BoundingBox) -> bool {
        if bbox.is_degenerate() || self.samples_per_edge == 0 {
            return false;
        }
        self.hit_ratio(mask, bbox) >= self.min_hit_ratio
    }
}
