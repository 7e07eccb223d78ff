//! Locates media through short-lived presigned blob store URLs.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use vigil_media::{MediaError, MediaInput, MediaLocator, MediaResult};
use vigil_models::MediaUnit;
use vigil_storage::BlobStore;

/// Long enough for ffprobe plus every frame seek of one media unit.
const DECODE_URL_TTL: Duration = Duration::from_secs(15 * 60);

/// [`MediaLocator`] handing ffmpeg a presigned GET URL.
pub struct BlobMediaLocator {
    blobs: Arc<dyn BlobStore>,
}

impl BlobMediaLocator {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }
}

#[async_trait]
impl MediaLocator for BlobMediaLocator {
    async fn locate(&self, media: &MediaUnit) -> MediaResult<MediaInput> {
        let handle = self
            .blobs
            .generate_access_handle(&media.storage_ref, DECODE_URL_TTL)
            .await
            .map_err(|e| MediaError::locate(format!("{}: {}", media.storage_ref, e)))?;
        Ok(MediaInput::Url(handle.url))
    }
}
