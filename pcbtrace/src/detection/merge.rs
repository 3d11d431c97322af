//! Reprojection of tile-local detections into full-image coordinates.

use super::tiles::Tile;
use super::{BoundingBox, Detection, RawDetection};

/// Shift a tile-local detection by its tile's `(left, top)` offset.
/// Width and height pass through unchanged.
pub fn reproject(raw: &RawDetection, left: u32, top: u32) -> Detection {
    Detection {
        class_name: raw.class_name.clone(),
        confidence: raw.confidence,
        bbox: BoundingBox {
            x: raw.x + left as f64,
            y: raw.y + top as f64,
            width: raw.width,
            height: raw.height,
        },
    }
}

/// Reproject every detection of one tile, preserving order.
pub fn merge_tile_detections(tile: &Tile, raw: &[RawDetection]) -> Vec<Detection> {
    let (left, top) = tile.offset();
    raw.iter().map(|r| reproject(r, left, top)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproject_adds_offset() {
        let raw = RawDetection::new("Capacitor", 0.7, 12.5, 30.0, 8.0, 4.0);
        let det = reproject(&raw, 360, 512);
        assert_eq!(det.bbox, BoundingBox::new(372.5, 542.0, 8.0, 4.0));
        assert_eq!(det.class_name, "Capacitor");
        assert_eq!(det.confidence, 0.7);
    }

    #[test]
    fn test_origin_tile_is_identity() {
        let raw = vec![
            RawDetection::new("IC", 0.9, 100.0, 50.0, 40.0, 20.0),
            RawDetection::new("LED", 0.3, 5.0, 5.0, 3.0, 3.0),
        ];
        let merged = merge_tile_detections(&Tile::whole(640, 480), &raw);
        assert_eq!(merged.len(), 2);
        for (m, r) in merged.iter().zip(&raw) {
            assert_eq!((m.bbox.x, m.bbox.y), (r.x, r.y));
        }
    }
}
