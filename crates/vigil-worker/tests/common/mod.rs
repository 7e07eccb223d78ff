//! Shared fakes for worker integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use image::{ImageOutputFormat, Rgb, RgbImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vigil_detection::{
    DetectionBackend, DetectionError, DetectionResult, PollStatus, RawDetection, ResultHandle,
};
use vigil_media::{FrameDecoder, FrameSource, MediaError, MediaResult, PreprocessConfig};
use vigil_models::{
    AccessHandle, AlertEvent, AlertKind, AlertSink, FrameSample, JobId, MediaUnit,
    MetricObservation, StorageRef,
};
use vigil_storage::{BlobStore, StorageResult};
use vigil_worker::PollPolicy;

/// Scripted reply to a submission.
#[derive(Debug, Clone, Copy)]
pub enum Submit {
    Accept,
    Throttle,
    Reject,
}

/// Scripted reply to a poll.
#[derive(Debug, Clone, Copy)]
pub enum Poll {
    Progress,
    Done,
    Fail,
    Transient,
    Gone,
}

/// Detection backend replaying scripted replies.
///
/// Once a script runs out, submissions are accepted and polls report
/// progress.
#[derive(Default)]
pub struct FakeBackend {
    submits: Mutex<VecDeque<Submit>>,
    polls: Mutex<VecDeque<Poll>>,
    detections: Vec<RawDetection>,
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub frames_submitted: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_submits(self, script: impl IntoIterator<Item = Submit>) -> Self {
        *self.submits.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn with_polls(self, script: impl IntoIterator<Item = Poll>) -> Self {
        *self.polls.lock().unwrap() = script.into_iter().collect();
        self
    }

    pub fn with_detection(mut self, label: &str, confidence: f32, offset: Duration) -> Self {
        self.detections.push(RawDetection {
            label: label.to_string(),
            confidence,
            offset_ms: offset.as_millis() as u64,
        });
        self
    }

    pub fn submits(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> usize {
        self.frames_submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetectionBackend for FakeBackend {
    async fn submit(&self, media: &MediaUnit, frames: &[FrameSample]) -> DetectionResult<JobId> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.submits.lock().unwrap().pop_front().unwrap_or(Submit::Accept);
        match step {
            Submit::Accept => {
                self.frames_submitted.store(frames.len(), Ordering::SeqCst);
                Ok(JobId::from_string(format!("job-{}-{}", media.id, n)))
            }
            Submit::Throttle => Err(DetectionError::Throttled("slow down".to_string())),
            Submit::Reject => Err(DetectionError::rejected("unsupported codec")),
        }
    }

    async fn poll(&self, job_id: &JobId) -> DetectionResult<PollStatus> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.polls.lock().unwrap().pop_front().unwrap_or(Poll::Progress);
        match step {
            Poll::Progress => Ok(PollStatus::InProgress),
            Poll::Done => Ok(PollStatus::Succeeded {
                result: ResultHandle::new(format!("res-{}", job_id)),
            }),
            Poll::Fail => Ok(PollStatus::Failed {
                reason: "model crashed".to_string(),
            }),
            Poll::Transient => Err(DetectionError::Unavailable("503".to_string())),
            Poll::Gone => Err(DetectionError::Gone(job_id.to_string())),
        }
    }

    async fn fetch(&self, _result: &ResultHandle) -> DetectionResult<Vec<RawDetection>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detections.clone())
    }
}

/// Blob store issuing fake presigned URLs.
pub struct FakeBlobStore {
    present: AtomicBool,
    issued: AtomicUsize,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self {
            present: AtomicBool::new(true),
            issued: AtomicUsize::new(0),
        }
    }

    /// Simulate the media being withdrawn.
    pub fn withdraw(&self) {
        self.present.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn generate_access_handle(
        &self,
        target: &StorageRef,
        ttl: Duration,
    ) -> StorageResult<AccessHandle> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(AccessHandle {
            target: target.clone(),
            url: format!("https://blobs.test/{}?sig={}", target, n),
            expires_at: Utc::now() + ChronoDuration::from_std(ttl).unwrap(),
        })
    }

    async fn exists(&self, _target: &StorageRef) -> StorageResult<bool> {
        Ok(self.present.load(Ordering::SeqCst))
    }
}

/// Alert sink capturing everything it is handed.
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<AlertEvent>>,
    observations: Mutex<Vec<MetricObservation>>,
}

impl RecordingSink {
    pub fn alerts(&self) -> Vec<AlertEvent> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn alert_kinds(&self) -> Vec<AlertKind> {
        self.alerts().iter().map(|a| a.kind).collect()
    }

    pub fn observations(&self, name: &str) -> Vec<MetricObservation> {
        self.observations
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect()
    }
}

impl AlertSink for RecordingSink {
    fn alert(&self, event: AlertEvent) {
        self.alerts.lock().unwrap().push(event);
    }

    fn observe(&self, observation: MetricObservation) {
        self.observations.lock().unwrap().push(observation);
    }
}

/// Decoder producing solid PNG frames.
pub struct FakeDecoder {
    duration: Duration,
}

#[async_trait]
impl FrameDecoder for FakeDecoder {
    fn duration(&self) -> Duration {
        self.duration
    }

    fn fps(&self) -> f64 {
        25.0
    }

    async fn decode_at(&self, _offset: Duration) -> MediaResult<Vec<u8>> {
        let img = RgbImage::from_pixel(32, 18, Rgb([40, 90, 160]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png)?;
        Ok(buf.into_inner())
    }
}

/// Frame source opening every media unit with the same duration, or
/// failing to open anything.
pub struct FakeSource {
    duration: Option<Duration>,
}

impl FakeSource {
    pub fn with_duration(duration: Duration) -> Self {
        Self {
            duration: Some(duration),
        }
    }

    pub fn corrupt() -> Self {
        Self { duration: None }
    }
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn open(&self, media: &MediaUnit) -> MediaResult<Arc<dyn FrameDecoder>> {
        match self.duration {
            Some(duration) => Ok(Arc::new(FakeDecoder { duration })),
            None => Err(MediaError::decode(format!(
                "moov atom not found in {}",
                media.storage_ref
            ))),
        }
    }
}

pub fn small_frames() -> PreprocessConfig {
    PreprocessConfig {
        width: 32,
        height: 18,
        jpeg_quality: 70,
        blur_sigma: 0.0,
    }
}

/// Fast policy for paused-clock tests.
pub fn fast_policy() -> PollPolicy {
    PollPolicy {
        base_delay: Duration::from_millis(100),
        backoff_factor: 2.0,
        max_delay: Duration::from_secs(1),
        max_attempts: 20,
        timeout: Duration::from_secs(30),
        max_submit_retries: 3,
        max_commit_retries: 3,
    }
}

pub fn frame(media: &MediaUnit, sequence: u32) -> FrameSample {
    FrameSample {
        media_id: media.id.clone(),
        sequence,
        offset: Duration::from_secs(u64::from(sequence)),
        payload: vec![0xFF, 0xD8],
        width: 32,
        height: 18,
    }
}
