//! Detection pipeline metrics.
//!
//! Emitted through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const FRAMES_DECODED_TOTAL: &str = "vdet_frames_decoded_total";
    pub const FRAMES_PROCESSED_TOTAL: &str = "vdet_frames_processed_total";
    pub const DETECTIONS_EMITTED_TOTAL: &str = "vdet_detections_emitted_total";
    pub const DETECTIONS_AREA_REJECTED_TOTAL: &str = "vdet_detections_area_rejected_total";
    pub const DETECTION_DURATION_SECONDS: &str = "vdet_detection_duration_seconds";
    pub const STREAMS_TOTAL: &str = "vdet_streams_total";
    pub const STAGING_CLEANUP_FAILURES_TOTAL: &str = "vdet_staging_cleanup_failures_total";
}

/// Record one decoded frame, sampled or not.
pub fn record_frame_decoded() {
    counter!(names::FRAMES_DECODED_TOTAL).increment(1);
}

/// Record one frame run through detection.
pub fn record_frame_processed(engine: &str, duration_secs: f64) {
    let labels = [("engine", engine.to_string())];
    counter!(names::FRAMES_PROCESSED_TOTAL, &labels).increment(1);
    histogram!(names::DETECTION_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record filter output for one frame.
pub fn record_filtered(kept: usize, rejected: usize) {
    counter!(names::DETECTIONS_EMITTED_TOTAL).increment(kept as u64);
    if rejected > 0 {
        counter!(names::DETECTIONS_AREA_REJECTED_TOTAL).increment(rejected as u64);
    }
}

/// Record how a stream ended.
pub fn record_stream_outcome(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::STREAMS_TOTAL, &labels).increment(1);
}

/// Record staged files that could not be removed.
pub fn record_cleanup_failures(count: usize) {
    if count > 0 {
        counter!(names::STAGING_CLEANUP_FAILURES_TOTAL).increment(count as u64);
    }
}
