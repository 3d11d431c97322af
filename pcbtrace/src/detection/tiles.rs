//! Tile planning for sliced inference.
//!
//! Large boards are split into overlapping fixed-size windows so that small
//! SMD parts keep enough pixels after the detector's own resize.

use serde::{Deserialize, Serialize};

use crate::config::SlicingConfig;

/// A tile in full-image pixel coordinates; `right`/`bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Tile {
    pub fn whole(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn offset(&self) -> (u32, u32) {
        (self.left, self.top)
    }
}

pub struct TileSlicer;

impl TileSlicer {
    /// Window step for the configured overlap; falls back to the tile size
    /// when the overlap would leave no forward progress.
    pub fn step(tile_size: u32, overlap_ratio: f64) -> u32 {
        let step = (tile_size as f64 * (1.0 - overlap_ratio)).floor();
        if step.is_finite() && step >= 1.0 {
            step as u32
        } else {
            tile_size
        }
    }

    /// Whether an image of this size is sliced at all under `config`.
    pub fn should_slice(width: u32, height: u32, config: &SlicingConfig) -> bool {
        config.enabled
            && config.tile_size > 0
            && (width > config.slice_threshold || height > config.slice_threshold)
    }

    /// Plan tiles for a `width` x `height` image, in raster order.
    ///
    /// Edge tiles are pulled back so they keep the full tile size whenever
    /// the image is at least that large. Windows that collapse onto an
    /// already planned tile are emitted once.
    pub fn plan(width: u32, height: u32, config: &SlicingConfig) -> Vec<Tile> {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        if !Self::should_slice(width, height, config) {
            return vec![Tile::whole(width, height)];
        }

        let size = config.tile_size;
        let step = Self::step(size, config.overlap_ratio) as usize;
        let mut tiles: Vec<Tile> = Vec::new();

        for top in (0..height).step_by(step) {
            for left in (0..width).step_by(step) {
                let right = left.saturating_add(size).min(width);
                let bottom = top.saturating_add(size).min(height);

                let left = if right - left < size && width > size {
                    right.saturating_sub(size)
                } else {
                    left
                };
                let top = if bottom - top < size && height > size {
                    bottom.saturating_sub(size)
                } else {
                    top
                };

                let tile = Tile {
                    left,
                    top,
                    right,
                    bottom,
                };
                if !tiles.contains(&tile) {
                    tiles.push(tile);
                }
            }
        }

        tracing::debug!(
            "Planned {} tiles for {}x{} image (size={}, step={})",
            tiles.len(),
            width,
            height,
            size,
            step
        );
        tiles
    }
}
