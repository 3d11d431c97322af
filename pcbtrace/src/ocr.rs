//! Text recognition collaborator used to name labelled components.

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    #[error("OCR failed: {0}")]
    Failed(String),
}

/// Reads printed text (part numbers, labels) from a component crop.
#[async_trait]
pub trait TextReader: Send + Sync {
    fn name(&self) -> &str;

    /// Text found in `crop`, or `None` when nothing legible is present.
    async fn read_text(&self, crop: &RgbImage) -> Result<Option<String>, OcrError>;
}

/// Reader for runs without an OCR engine: never finds text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTextReader;

#[async_trait]
impl TextReader for NoTextReader {
    fn name(&self) -> &str {
        "none"
    }

    async fn read_text(&self, _crop: &RgbImage) -> Result<Option<String>, OcrError> {
        Ok(None)
    }
}
