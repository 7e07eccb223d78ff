//! Sampled video frames.

use std::fmt;
use std::time::Duration;

use crate::ids::MediaId;

/// A single extracted and preprocessed frame.
///
/// Lives only for the duration of a job submission and is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameSample {
    /// Parent media unit
    pub media_id: MediaId,
    /// Position of this frame in the sampled sequence
    pub sequence: u32,
    /// Offset from the start of the media
    pub offset: Duration,
    /// Encoded (JPEG) frame bytes
    pub payload: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl FrameSample {
    pub fn offset_ms(&self) -> u64 {
        self.offset.as_millis() as u64
    }
}

impl fmt::Debug for FrameSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSample")
            .field("media_id", &self.media_id)
            .field("sequence", &self.sequence)
            .field("offset", &self.offset)
            .field("payload_bytes", &self.payload.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
