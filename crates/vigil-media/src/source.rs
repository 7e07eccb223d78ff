//! Opening media units for frame extraction.
//!
//! A [`MediaLocator`] turns a storage reference into something FFmpeg can
//! read, and a [`FrameSource`] opens it as a [`FrameDecoder`] that can grab a
//! single frame at an arbitrary offset.

use async_trait::async_trait;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use vigil_models::MediaUnit;

use crate::command::{FfmpegRunner, FrameGrab};
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Input FFmpeg can open: a local file or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaInput {
    Path(PathBuf),
    Url(String),
}

impl MediaInput {
    pub fn as_arg(&self) -> String {
        match self {
            MediaInput::Path(path) => path.to_string_lossy().to_string(),
            MediaInput::Url(url) => url.clone(),
        }
    }
}

impl fmt::Display for MediaInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaInput::Path(path) => write!(f, "{}", path.display()),
            // Presigned URLs carry credentials in the query string
            MediaInput::Url(url) => write!(f, "{}", url.split('?').next().unwrap_or(url)),
        }
    }
}

/// Resolves a media unit's storage reference to a readable input.
#[async_trait]
pub trait MediaLocator: Send + Sync {
    async fn locate(&self, media: &MediaUnit) -> MediaResult<MediaInput>;
}

/// Locator for media stored under a local directory.
#[derive(Debug, Clone)]
pub struct LocalLocator {
    root: PathBuf,
}

impl LocalLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join a storage reference onto the root, refusing escapes.
    pub fn resolve(&self, storage_ref: &str) -> MediaResult<PathBuf> {
        let relative = Path::new(storage_ref.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(MediaError::SecurityViolation(format!(
                "storage reference escapes media root: {}",
                storage_ref
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaLocator for LocalLocator {
    async fn locate(&self, media: &MediaUnit) -> MediaResult<MediaInput> {
        let path = self.resolve(media.storage_ref.as_str())?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(MediaError::FileNotFound(path));
        }
        Ok(MediaInput::Path(path))
    }
}

/// A media unit opened for random-access frame extraction.
#[async_trait]
pub trait FrameDecoder: Send + Sync {
    /// Total media duration.
    fn duration(&self) -> Duration;

    /// Native frame rate.
    fn fps(&self) -> f64;

    /// Decode the frame at `offset` into an encoded still image.
    async fn decode_at(&self, offset: Duration) -> MediaResult<Vec<u8>>;
}

/// Opens media units as [`FrameDecoder`]s.
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn open(&self, media: &MediaUnit) -> MediaResult<Arc<dyn FrameDecoder>>;
}

/// FFprobe/FFmpeg-backed frame source.
pub struct FfmpegFrameSource {
    locator: Arc<dyn MediaLocator>,
    timeout_secs: u64,
}

impl FfmpegFrameSource {
    pub fn new(locator: Arc<dyn MediaLocator>) -> Self {
        Self {
            locator,
            timeout_secs: 30,
        }
    }

    /// Per-frame extraction timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn open(&self, media: &MediaUnit) -> MediaResult<Arc<dyn FrameDecoder>> {
        let input = self.locator.locate(media).await?;
        let info = probe_video(&input).await?;
        if info.duration <= 0.0 {
            return Err(MediaError::InvalidVideo(format!(
                "{} reports no duration",
                input
            )));
        }
        debug!(
            media_id = %media.id,
            input = %input,
            duration = info.duration,
            fps = info.fps,
            "Opened media for sampling"
        );
        Ok(Arc::new(FfmpegDecoder {
            input,
            info,
            runner: FfmpegRunner::new().with_timeout(self.timeout_secs),
        }))
    }
}

struct FfmpegDecoder {
    input: MediaInput,
    info: VideoInfo,
    runner: FfmpegRunner,
}

#[async_trait]
impl FrameDecoder for FfmpegDecoder {
    fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.info.duration)
    }

    fn fps(&self) -> f64 {
        self.info.fps
    }

    async fn decode_at(&self, offset: Duration) -> MediaResult<Vec<u8>> {
        let grab = FrameGrab::new(self.input.as_arg(), offset);
        let bytes = self.runner.capture(&grab).await?;
        if bytes.is_empty() {
            return Err(MediaError::ffmpeg_failed(
                format!("no frame at {:.3}s", offset.as_secs_f64()),
                None,
                None,
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_models::StorageRef;

    #[test]
    fn test_local_locator_rejects_traversal() {
        let locator = LocalLocator::new("/srv/media");
        assert!(matches!(
            locator.resolve("../etc/passwd"),
            Err(MediaError::SecurityViolation(_))
        ));
        assert_eq!(
            locator.resolve("/cam-1/a.mp4").unwrap(),
            PathBuf::from("/srv/media/cam-1/a.mp4")
        );
    }

    #[tokio::test]
    async fn test_local_locator_finds_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cam-1")).unwrap();
        std::fs::write(dir.path().join("cam-1/a.mp4"), b"not really video").unwrap();

        let locator = LocalLocator::new(dir.path());
        let media = MediaUnit::new("cam-1", "Lobby", StorageRef::new("cam-1/a.mp4"));
        let input = locator.locate(&media).await.unwrap();
        assert_eq!(input, MediaInput::Path(dir.path().join("cam-1/a.mp4")));

        let missing = MediaUnit::new("cam-1", "Lobby", StorageRef::new("cam-1/b.mp4"));
        assert!(matches!(
            locator.locate(&missing).await,
            Err(MediaError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_url_display_hides_query() {
        let input = MediaInput::Url("https://s3/bucket/key.mp4?X-Amz-Signature=abc".into());
        assert_eq!(input.to_string(), "https://s3/bucket/key.mp4");
    }
}
