//! Frame sampling for the Vigil detection pipeline.
//!
//! This crate provides:
//! - FFprobe/FFmpeg-backed random-access frame extraction
//! - Per-frame preprocessing (resize, denoise, JPEG)
//! - A lazy, restartable stream of frame samples per media unit

pub mod command;
pub mod error;
pub mod metrics;
pub mod preprocess;
pub mod probe;
pub mod sampler;
pub mod source;

pub use command::{FfmpegRunner, FrameGrab};
pub use error::{MediaError, MediaResult};
pub use preprocess::{preprocess, PreprocessConfig, ProcessedFrame};
pub use probe::{probe_video, VideoInfo};
pub use sampler::{sample_offsets, FrameSampler, FrameSamples, MAX_SAMPLES, MIN_SAMPLE_INTERVAL};
pub use source::{FfmpegFrameSource, FrameDecoder, FrameSource, LocalLocator, MediaInput, MediaLocator};
