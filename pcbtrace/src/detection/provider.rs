//! Detector collaborator interface.
//!
//! The object-detection model runs outside this crate. Anything that can turn
//! an image tile into tile-local predictions implements [`Detector`]; the
//! pipeline receives it as an injected dependency so tests can substitute a
//! deterministic fake.

use async_trait::async_trait;
use image::RgbImage;
use thiserror::Error;

use super::RawDetection;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Inference request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Inference API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Rate limited. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error("Failed to parse inference response: {0}")]
    ParseError(String),
    #[error("Failed to encode tile: {0}")]
    EncodeError(String),
    #[error("Detector unavailable: {0}")]
    Unavailable(String),
}

/// Common trait for object-detection backends.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Run the model on one tile. Coordinates in the result are relative to
    /// the tile's top-left corner.
    async fn infer(&self, tile: &RgbImage) -> Result<Vec<RawDetection>, DetectorError>;
}
