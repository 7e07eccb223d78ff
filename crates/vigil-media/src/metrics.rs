//! Frame sampling metrics.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Frames successfully sampled and preprocessed.
    pub const FRAMES_SAMPLED: &str = "vigil_frames_sampled_total";

    /// Frames skipped because they could not be decoded.
    pub const FRAMES_SKIPPED: &str = "vigil_frames_skipped_total";
}

/// Record a skipped frame.
pub fn record_frame_skipped() {
    counter!(names::FRAMES_SKIPPED).increment(1);
}

/// Record a completed sampling pass.
pub fn record_frames_sampled(count: usize) {
    counter!(names::FRAMES_SAMPLED).increment(count as u64);
}
