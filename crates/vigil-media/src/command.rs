//! FFmpeg frame-grab invocation.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// One still frame pulled from a video at a fixed offset and written to
/// stdout as PNG. Resizing and compression happen later in preprocessing.
#[derive(Debug, Clone)]
pub struct FrameGrab {
    input: String,
    offset: Duration,
}

impl FrameGrab {
    pub fn new(input: impl Into<String>, offset: Duration) -> Self {
        Self {
            input: input.into(),
            offset,
        }
    }

    pub fn offset(&self) -> Duration {
        self.offset
    }

    /// Arguments for `ffmpeg`. The seek goes before `-i` so FFmpeg jumps to the
    /// nearest keyframe instead of decoding from the start.
    pub fn args(&self) -> Vec<String> {
        vec![
            "-nostdin".into(),
            "-v".into(),
            "error".into(),
            "-ss".into(),
            format!("{:.3}", self.offset.as_secs_f64()),
            "-i".into(),
            self.input.clone(),
            "-frames:v".into(),
            "1".into(),
            "-f".into(),
            "image2pipe".into(),
            "-c:v".into(),
            "png".into(),
            "pipe:1".into(),
        ]
    }
}

/// Runs frame grabs under an optional wall-clock limit.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    /// Run the grab and return the encoded image bytes.
    pub async fn capture(&self, grab: &FrameGrab) -> MediaResult<Vec<u8>> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = grab.args();
        debug!(offset = grab.offset().as_secs_f64(), "ffmpeg {}", args.join(" "));

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    // child is killed when the future is dropped
                    warn!(secs = limit.as_secs(), "Frame grab timed out");
                    MediaError::Timeout(limit.as_secs())
                })??,
            None => child.wait_with_output().await?,
        };

        if !output.status.success() {
            return Err(MediaError::ffmpeg_failed(
                format!("frame grab at {:.3}s failed", grab.offset().as_secs_f64()),
                Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                output.status.code(),
            ));
        }
        Ok(output.stdout)
    }
}
