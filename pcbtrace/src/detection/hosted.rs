//! Client for a hosted object-detection endpoint.
//!
//! The endpoint takes a base64-encoded JPEG as a form body at
//! `{api_url}/{model_id}?api_key=...` and answers with
//! `{ "predictions": [...] }` in tile pixel coordinates.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use image::{ImageFormat, RgbImage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::provider::{Detector, DetectorError};
use super::{PredictionSet, RawDetection};

const DEFAULT_API_URL: &str = "https://serverless.roboflow.com";
const DEFAULT_MODEL_ID: &str = "pcb-components-mechu/6";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostedDetectorConfig {
    pub api_url: String,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for HostedDetectorConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: MAX_RETRIES,
        }
    }
}

impl HostedDetectorConfig {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.model_id.trim_start_matches('/')
        )
    }
}

pub struct HostedDetector {
    client: Client,
    config: HostedDetectorConfig,
}

impl HostedDetector {
    pub fn new(config: HostedDetectorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &HostedDetectorConfig {
        &self.config
    }

    async fn send_request(&self, body: String) -> Result<PredictionSet, DetectorError> {
        let mut retry_count = 0;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        loop {
            let response = self
                .client
                .post(self.config.endpoint())
                .query(&[("api_key", self.config.api_key.as_str())])
                .header("content-type", "application/x-www-form-urlencoded")
                .timeout(Duration::from_secs(self.config.timeout_secs))
                .body(body.clone())
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return resp.json::<PredictionSet>().await.map_err(|e| {
                            DetectorError::ParseError(format!("Failed to parse JSON: {}", e))
                        });
                    } else if status.as_u16() == 429 {
                        let retry_after = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|h| h.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(delay_ms / 1000);

                        if retry_count < self.config.max_retries {
                            retry_count += 1;
                            tracing::warn!(
                                "Inference rate limited. Retrying after {} seconds (attempt {}/{})",
                                retry_after,
                                retry_count,
                                self.config.max_retries
                            );
                            sleep(Duration::from_secs(retry_after)).await;
                            delay_ms *= 2;
                            continue;
                        }
                        return Err(DetectorError::RateLimited { retry_after });
                    } else {
                        let message = resp
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(DetectorError::ApiError {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
                Err(e) => {
                    if retry_count < self.config.max_retries {
                        retry_count += 1;
                        tracing::warn!(
                            "Inference request failed: {}. Retrying in {}ms (attempt {}/{})",
                            e,
                            delay_ms,
                            retry_count,
                            self.config.max_retries
                        );
                        sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms *= 2;
                        continue;
                    }
                    return Err(DetectorError::RequestFailed(e));
                }
            }
        }
    }
}

/// Base64 JPEG body for one tile.
pub fn encode_tile(tile: &RgbImage) -> Result<String, DetectorError> {
    let mut bytes = Vec::new();
    tile.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .map_err(|e| DetectorError::EncodeError(e.to_string()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[async_trait]
impl Detector for HostedDetector {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn infer(&self, tile: &RgbImage) -> Result<Vec<RawDetection>, DetectorError> {
        if self.config.api_key.is_empty() {
            return Err(DetectorError::Unavailable(
                "no API key configured for hosted detector".to_string(),
            ));
        }
        let body = encode_tile(tile)?;
        let set = self.send_request(body).await?;
        tracing::debug!(
            "Hosted detector returned {} predictions for {}x{} tile",
            set.predictions.len(),
            tile.width(),
            tile.height()
        );
        Ok(set.predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let config = HostedDetectorConfig {
            api_url: "https://example.test/".to_string(),
            model_id: "/boards/2".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "https://example.test/boards/2");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = HostedDetectorConfig {
            api_key: "secret".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_encode_tile_is_base64_jpeg() {
        let tile = RgbImage::from_pixel(16, 16, image::Rgb([10, 200, 30]));
        let body = encode_tile(&tile).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let detector = HostedDetector::new(HostedDetectorConfig::default());
        let tile = RgbImage::new(8, 8);
        let err = detector.infer(&tile).await.unwrap_err();
        assert!(matches!(err, DetectorError::Unavailable(_)));
    }
}
