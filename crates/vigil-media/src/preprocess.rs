//! Per-frame preprocessing: resize, denoise, lossy compression.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::ColorType;

use crate::error::{MediaError, MediaResult};

/// Preprocessing applied to every sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Gaussian blur sigma for noise reduction; 0 disables
    pub blur_sigma: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            jpeg_quality: 85,
            // Roughly a 5x5 kernel
            blur_sigma: 1.1,
        }
    }
}

impl PreprocessConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            width: std::env::var("FRAME_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|w| *w > 0)
                .unwrap_or(defaults.width),
            height: std::env::var("FRAME_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|h| *h > 0)
                .unwrap_or(defaults.height),
            jpeg_quality: std::env::var("FRAME_JPEG_QUALITY")
                .ok()
                .and_then(|s| s.parse::<u8>().ok())
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.jpeg_quality),
            blur_sigma: std::env::var("FRAME_BLUR_SIGMA")
                .ok()
                .and_then(|s| s.parse::<f32>().ok())
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(defaults.blur_sigma),
        }
    }
}

/// A preprocessed frame ready for submission.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode an encoded still image and apply the preprocessing chain.
///
/// CPU-bound; callers on the async runtime should use [`preprocess_blocking`].
pub fn preprocess(encoded: &[u8], config: &PreprocessConfig) -> MediaResult<ProcessedFrame> {
    let decoded = image::load_from_memory(encoded)?.to_rgb8();

    let mut frame = imageops::resize(&decoded, config.width, config.height, FilterType::Triangle);
    if config.blur_sigma > 0.0 {
        frame = imageops::blur(&frame, config.blur_sigma);
    }

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;

    Ok(ProcessedFrame {
        jpeg,
        width: frame.width(),
        height: frame.height(),
    })
}

/// Run [`preprocess`] on the blocking pool.
pub async fn preprocess_blocking(
    encoded: Vec<u8>,
    config: PreprocessConfig,
) -> MediaResult<ProcessedFrame> {
    tokio::task::spawn_blocking(move || preprocess(&encoded, &config))
        .await
        .map_err(|e| MediaError::internal(format!("preprocess task failed: {}", e)))?
}
