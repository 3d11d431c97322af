//! Copper track segmentation.
//!
//! The board substrate is isolated by colour in HSV space, cleaned with a
//! morphological opening then closing, and inverted: whatever is not
//! substrate is treated as copper.

pub mod overlap;

pub use overlap::OverlapSampler;

use std::path::Path;

use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology;
use serde::{Deserialize, Serialize};

use crate::config::{MorphologyConfig, TrackMaskConfig};
use crate::core::{load_rgb_image, PcbTraceError};

/// Inclusive HSV bounds on the OpenCV 8-bit scale (H 0-179, S/V 0-255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Convert an RGB pixel to HSV on the OpenCV 8-bit scale.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { diff * 255.0 / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = (h / 2.0).round() as u16 % 180;
    [h as u8, s.round() as u8, v as u8]
}

/// Full-resolution copper mask. Read-only once built.
///
/// Keeps a summed-area table so any rectangle's track count is O(1).
#[derive(Debug, Clone)]
pub struct BinaryTrackMask {
    image: GrayImage,
    integral: Vec<u64>,
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`; may extend past the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelRect {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Square neighbourhood `[x - margin, x + margin)` on both axes.
    pub fn around(x: i64, y: i64, margin: i64) -> Self {
        Self::new(
            x.saturating_sub(margin),
            y.saturating_sub(margin),
            x.saturating_add(margin),
            y.saturating_add(margin),
        )
    }

    fn clip(&self, width: u32, height: u32) -> Option<(usize, usize, usize, usize)> {
        let x0 = self.x0.clamp(0, width as i64);
        let y0 = self.y0.clamp(0, height as i64);
        let x1 = self.x1.clamp(0, width as i64);
        let y1 = self.y1.clamp(0, height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
    }
}

impl BinaryTrackMask {
    /// Build from a grayscale image; pixels above 127 are track.
    pub fn from_gray(image: GrayImage) -> Self {
        let mut image = image;
        for p in image.pixels_mut() {
            p.0[0] = if p.0[0] > 127 { 255 } else { 0 };
        }
        let integral = summed_area(&image);
        Self { image, integral }
    }

    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> bool,
    {
        let image = GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { 255 } else { 0 }])
        });
        Self::from_gray(image)
    }

    pub fn empty(width: u32, height: u32) -> Self {
        Self::from_fn(width, height, |_, _| false)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Track at `(x, y)`; false outside the mask.
    pub fn is_track(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width() as i64 || y >= self.height() as i64 {
            return false;
        }
        self.image.get_pixel(x as u32, y as u32).0[0] > 127
    }

    /// Number of track pixels inside `rect` after clipping to the mask.
    pub fn count_in(&self, rect: PixelRect) -> u64 {
        let Some((x0, y0, x1, y1)) = rect.clip(self.width(), self.height()) else {
            return 0;
        };
        let stride = self.width() as usize + 1;
        let at = |x: usize, y: usize| self.integral[y * stride + x];
        at(x1, y1) + at(x0, y0) - at(x0, y1) - at(x1, y0)
    }

    /// Pixel count of `rect` after clipping to the mask.
    pub fn area_in(&self, rect: PixelRect) -> u64 {
        rect.clip(self.width(), self.height())
            .map(|(x0, y0, x1, y1)| ((x1 - x0) * (y1 - y0)) as u64)
            .unwrap_or(0)
    }

    pub fn any_track_in(&self, rect: PixelRect) -> bool {
        self.count_in(rect) > 0
    }

    /// Track fraction of `rect`; `None` when the clipped region is empty.
    pub fn density_in(&self, rect: PixelRect) -> Option<f64> {
        let area = self.area_in(rect);
        if area == 0 {
            return None;
        }
        Some(self.count_in(rect) as f64 / area as f64)
    }

    /// Track fraction of the whole mask.
    pub fn coverage(&self) -> f64 {
        self.density_in(PixelRect::new(0, 0, self.width() as i64, self.height() as i64))
            .unwrap_or(0.0)
    }

    /// White-on-black rendering (255 = track).
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    pub fn save(&self, path: &Path) -> Result<(), PcbTraceError> {
        self.image
            .save(path)
            .map_err(|e| PcbTraceError::ImageWrite(format!("{}: {}", path.display(), e)))
    }
}

fn summed_area(image: &GrayImage) -> Vec<u64> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0u64;
        for x in 0..w {
            if image.get_pixel(x as u32, y as u32).0[0] > 127 {
                row += 1;
            }
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
        }
    }
    table
}

/// Colour-threshold and morphology stage producing a [`BinaryTrackMask`].
#[derive(Debug, Clone)]
pub struct TrackMaskExtractor {
    pub range: HsvRange,
    pub morphology: MorphologyConfig,
}

impl TrackMaskExtractor {
    pub fn from_config(config: &TrackMaskConfig) -> Self {
        Self {
            range: config.profile.range(),
            morphology: config.morphology.clone(),
        }
    }

    /// 255 where the pixel falls inside the substrate colour range.
    pub fn substrate_mask(&self, image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let hsv = rgb_to_hsv(image.get_pixel(x, y).0);
            Luma([if self.range.contains(hsv) { 255 } else { 0 }])
        })
    }

    fn radius(&self, iterations: u32) -> u8 {
        let r = (self.morphology.kernel_size / 2).saturating_mul(iterations);
        r.min(u8::MAX as u32) as u8
    }

    pub fn extract(&self, image: &RgbImage) -> BinaryTrackMask {
        let mut mask = self.substrate_mask(image);
        tracing::debug!("Applied HSV range {:?}..{:?}", self.range.lower, self.range.upper);

        // Repeated 3x3 passes equal one pass with a proportionally larger square.
        let open_r = self.radius(self.morphology.open_iterations);
        if open_r > 0 {
            mask = morphology::open(&mask, Norm::LInf, open_r);
        }
        let close_r = self.radius(self.morphology.close_iterations);
        if close_r > 0 {
            mask = morphology::close(&mask, Norm::LInf, close_r);
        }

        imageops::invert(&mut mask);
        let tracks = BinaryTrackMask::from_gray(mask);
        tracing::info!(
            "Track extraction complete: {}x{}, {:.1}% track pixels",
            tracks.width(),
            tracks.height(),
            tracks.coverage() * 100.0
        );
        tracks
    }

    /// Load an image file and extract its track mask.
    pub fn extract_from_path(&self, path: &Path) -> Result<BinaryTrackMask, PcbTraceError> {
        let image = load_rgb_image(path)?;
        Ok(self.extract(&image))
    }
}
