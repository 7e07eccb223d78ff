//! Frame sampler.
//!
//! Samples one frame every `interval` of media time, starting at offset 0,
//! and preprocesses each frame before emitting it. The resulting
//! [`FrameSamples`] is lazy: nothing is decoded until the stream is polled,
//! and every call to [`FrameSamples::stream`] restarts from the first frame.

use futures_util::stream::{self, Stream, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use vigil_models::{FrameSample, MediaId, MediaUnit};

use crate::error::{MediaError, MediaResult};
use crate::metrics::{record_frame_skipped, record_frames_sampled};
use crate::preprocess::{preprocess_blocking, PreprocessConfig};
use crate::source::{FrameDecoder, FrameSource};

/// Shortest accepted sampling interval.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on frames planned for one media unit.
pub const MAX_SAMPLES: u32 = 250_000;

/// Offsets `0, interval, 2*interval, ...` up to and including `duration`.
///
/// Intervals below [`MIN_SAMPLE_INTERVAL`], or plans exceeding
/// [`MAX_SAMPLES`] frames, are rejected with [`MediaError::InvalidInterval`].
pub fn sample_offsets(duration: Duration, interval: Duration) -> MediaResult<Vec<Duration>> {
    if interval < MIN_SAMPLE_INTERVAL {
        return Err(MediaError::InvalidInterval(interval));
    }
    let count = duration.as_nanos() / interval.as_nanos() + 1;
    let count = u32::try_from(count)
        .ok()
        .filter(|count| *count <= MAX_SAMPLES)
        .ok_or(MediaError::InvalidInterval(interval))?;
    Ok((0..count).map(|i| interval * i).collect())
}

/// Samples frames from media units.
pub struct FrameSampler {
    source: Arc<dyn FrameSource>,
    preprocess: PreprocessConfig,
}

impl FrameSampler {
    pub fn new(source: Arc<dyn FrameSource>, preprocess: PreprocessConfig) -> Self {
        Self { source, preprocess }
    }

    /// Open `media` and plan its samples.
    ///
    /// Fails with [`MediaError::Decode`] when the media cannot be opened at
    /// all; individual frames that fail later are skipped.
    pub async fn sample(&self, media: &MediaUnit, interval: Duration) -> MediaResult<FrameSamples> {
        if interval < MIN_SAMPLE_INTERVAL {
            return Err(MediaError::InvalidInterval(interval));
        }

        let decoder = self.source.open(media).await.map_err(|e| match e {
            MediaError::Decode(_) => e,
            other => MediaError::decode(format!("cannot open {}: {}", media.storage_ref, other)),
        })?;

        let offsets = sample_offsets(decoder.duration(), interval)?;
        debug!(
            media_id = %media.id,
            frames = offsets.len(),
            interval_ms = interval.as_millis() as u64,
            "Planned frame samples"
        );

        Ok(FrameSamples {
            media_id: media.id.clone(),
            decoder,
            offsets: Arc::new(offsets),
            preprocess: self.preprocess.clone(),
            skipped: Arc::new(AtomicU32::new(0)),
        })
    }
}

/// Lazy, restartable sequence of preprocessed frames for one media unit.
pub struct FrameSamples {
    media_id: MediaId,
    decoder: Arc<dyn FrameDecoder>,
    offsets: Arc<Vec<Duration>>,
    preprocess: PreprocessConfig,
    skipped: Arc<AtomicU32>,
}

impl FrameSamples {
    /// Planned sample offsets.
    pub fn offsets(&self) -> &[Duration] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Frames skipped by the most recent pass.
    pub fn skipped(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Stream the frames from the beginning.
    pub fn stream(&self) -> impl Stream<Item = FrameSample> + Send + 'static {
        self.skipped.store(0, Ordering::Relaxed);

        let media_id = self.media_id.clone();
        let decoder = Arc::clone(&self.decoder);
        let offsets = Arc::clone(&self.offsets);
        let preprocess = self.preprocess.clone();
        let skipped = Arc::clone(&self.skipped);

        let last_frame = last_frame_position(decoder.duration(), decoder.fps());

        stream::iter(0..offsets.len())
            .then(move |index| {
                let media_id = media_id.clone();
                let decoder = Arc::clone(&decoder);
                let offset = offsets[index];
                let preprocess = preprocess.clone();
                let skipped = Arc::clone(&skipped);
                async move {
                    let position = offset.min(last_frame);
                    match extract(decoder.as_ref(), position, preprocess).await {
                        Ok((payload, width, height)) => Some(FrameSample {
                            media_id,
                            sequence: index as u32,
                            offset,
                            payload,
                            width,
                            height,
                        }),
                        Err(e) => {
                            warn!(
                                media_id = %media_id,
                                sequence = index,
                                offset_ms = offset.as_millis() as u64,
                                error = %e,
                                "Skipping undecodable frame"
                            );
                            skipped.fetch_add(1, Ordering::Relaxed);
                            record_frame_skipped();
                            None
                        }
                    }
                }
            })
            .filter_map(|sample| async move { sample })
    }

    /// Drain the stream into memory.
    pub async fn collect(&self) -> Vec<FrameSample> {
        let frames: Vec<FrameSample> = self.stream().collect().await;
        record_frames_sampled(frames.len());
        frames
    }
}

async fn extract(
    decoder: &dyn FrameDecoder,
    position: Duration,
    preprocess: PreprocessConfig,
) -> MediaResult<(Vec<u8>, u32, u32)> {
    let raw = decoder.decode_at(position).await?;
    let frame = preprocess_blocking(raw, preprocess).await?;
    Ok((frame.jpeg, frame.width, frame.height))
}

/// Seek position of the final frame, so a sample at exactly `duration` still decodes.
fn last_frame_position(duration: Duration, fps: f64) -> Duration {
    if fps <= 0.0 || !fps.is_finite() {
        return duration;
    }
    duration.saturating_sub(Duration::from_secs_f64(1.0 / fps))
}
