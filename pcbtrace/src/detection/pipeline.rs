//! Tiled inference for one image.
//!
//! Tiles are sent to the detector concurrently (bounded by
//! `inference.max_concurrent_tiles`); results are merged in tile order once
//! every call has finished, then reduced with a global NMS pass.

use std::sync::Arc;

use image::{imageops, RgbImage};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{NmsConfig, PipelineConfig};

use super::merge::merge_tile_detections;
use super::nms::NmsReducer;
use super::provider::Detector;
use super::tiles::{Tile, TileSlicer};
use super::{Detection, RawDetection};

/// Result of the detection stage for one image.
#[derive(Debug, Clone, Default)]
pub struct DetectionOutcome {
    /// Final detections in full-image coordinates, highest confidence first.
    pub detections: Vec<Detection>,
    pub tiles: Vec<Tile>,
    pub failed_tiles: usize,
    /// Predictions returned by the detector before any suppression.
    pub raw_count: usize,
    pub warnings: Vec<String>,
}

impl DetectionOutcome {
    pub fn all_tiles_failed(&self) -> bool {
        !self.tiles.is_empty() && self.failed_tiles == self.tiles.len()
    }
}

/// Reproject each tile's predictions, drop degenerate boxes, optionally
/// suppress duplicates inside each tile, then run the global NMS pass.
pub fn merge_tiles(results: &[(Tile, Vec<RawDetection>)], nms: &NmsConfig) -> Vec<Detection> {
    let reducer = NmsReducer::from_config(nms);
    let mut merged = Vec::new();
    let mut degenerate = 0;
    for (tile, raw) in results {
        let mut detections = merge_tile_detections(tile, raw);
        let before = detections.len();
        detections.retain(|d| !d.bbox.is_degenerate());
        degenerate += before - detections.len();
        if nms.per_tile {
            merged.extend(reducer.reduce(detections));
        } else {
            merged.extend(detections);
        }
    }
    if degenerate > 0 {
        tracing::debug!("Dropped {} detections with degenerate boxes", degenerate);
    }
    reducer.reduce(merged)
}

fn crop_tile(image: &RgbImage, tile: &Tile) -> RgbImage {
    if tile.left == 0
        && tile.top == 0
        && tile.right == image.width()
        && tile.bottom == image.height()
    {
        return image.clone();
    }
    imageops::crop_imm(image, tile.left, tile.top, tile.width(), tile.height()).to_image()
}

/// Detect components on `image` with `detector`.
///
/// A tile whose inference fails contributes no detections; the failure is
/// logged and recorded in [`DetectionOutcome::warnings`]. If every tile
/// fails the outcome simply holds no detections.
pub async fn detect_components(
    image: Arc<RgbImage>,
    detector: Arc<dyn Detector>,
    config: &PipelineConfig,
) -> DetectionOutcome {
    let tiles = TileSlicer::plan(image.width(), image.height(), &config.slicing);
    if tiles.len() > 1 {
        tracing::info!(
            "Using sliced inference: {} tiles (tile_size={}, overlap={})",
            tiles.len(),
            config.slicing.tile_size,
            config.slicing.overlap_ratio
        );
    } else {
        tracing::info!(
            "Using standard inference on the whole {}x{} image",
            image.width(),
            image.height()
        );
    }

    let semaphore = Arc::new(Semaphore::new(config.inference.max_concurrent_tiles.max(1)));
    let mut set = JoinSet::new();

    for (index, tile) in tiles.iter().copied().enumerate() {
        let image = Arc::clone(&image);
        let detector = Arc::clone(&detector);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let crop = crop_tile(&image, &tile);
            (index, detector.infer(&crop).await)
        });
    }

    let mut per_tile: Vec<Option<Vec<RawDetection>>> = vec![None; tiles.len()];
    let mut warnings = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(raw))) => per_tile[index] = Some(raw),
            Ok((index, Err(e))) => {
                let tile = tiles[index];
                tracing::warn!(
                    "Inference failed for tile {} at ({}, {}) via {}: {}",
                    index,
                    tile.left,
                    tile.top,
                    detector.name(),
                    e
                );
                warnings.push(format!(
                    "tile {} at ({}, {}) failed: {}",
                    index, tile.left, tile.top, e
                ));
            }
            Err(e) => {
                tracing::warn!("Inference task aborted: {}", e);
                warnings.push(format!("inference task aborted: {}", e));
            }
        }
    }

    // Merge barrier: everything below runs on the completed set, in tile order.
    let failed_tiles = per_tile.iter().filter(|r| r.is_none()).count();
    let results: Vec<(Tile, Vec<RawDetection>)> = tiles
        .iter()
        .zip(per_tile)
        .filter_map(|(tile, raw)| raw.map(|raw| (*tile, raw)))
        .collect();
    let raw_count = results.iter().map(|(_, raw)| raw.len()).sum();

    let detections = merge_tiles(&results, &config.nms);

    if !tiles.is_empty() && failed_tiles == tiles.len() {
        tracing::warn!("Inference failed for all {} tiles; no components detected", tiles.len());
    } else if failed_tiles > 0 {
        tracing::warn!(
            "Proceeding with partial detections: {}/{} tiles failed",
            failed_tiles,
            tiles.len()
        );
    }
    tracing::info!(
        "Detection complete: {} raw predictions, {} after NMS",
        raw_count,
        detections.len()
    );

    DetectionOutcome {
        detections,
        tiles,
        failed_tiles,
        raw_count,
        warnings,
    }
}
