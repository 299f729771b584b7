//! Media pipeline for the streaming detection service.
//!
//! This crate provides:
//! - Request-scoped staging of uploaded artifacts with guaranteed cleanup
//! - Frame sources over FFmpeg (video) and the `image` crate (stills)
//! - YOLOv8 ONNX object detection with area-ratio filtering
//! - An incremental NDJSON frame emitter with cancellation

pub mod command;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod source;
pub mod staging;

#[cfg(test)]
mod test_support;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand};
pub use detection::{
    detect_image, filter_detections, ClassNames, DetectorLoader, FrameStreamer, ObjectDetector,
    OnnxDetectorLoader, RecordSender, StreamOutcome, StreamState, StreamSummary,
};
pub use error::{MediaError, MediaResult};
pub use probe::{effective_frame_rate, probe_video, VideoInfo, DEFAULT_FRAME_RATE};
pub use source::{FfmpegMediaOpener, Frame, FrameSource, MediaOpener};
pub use staging::{
    media_extension, ArtifactStager, ArtifactStore, ArtifactWriter, StagedFile, TempDirStore,
    MODEL_EXTENSION,
};
