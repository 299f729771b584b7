//! Shared data models for the streaming detection service.
//!
//! This crate provides Serde-serializable types for:
//! - Per-frame detection records streamed as NDJSON
//! - Raw model boxes before filtering
//! - The per-request threshold configuration
//! - Uploaded artifact and media kinds

pub mod artifact;
pub mod detection;
pub mod threshold;

// Re-export common types
pub use artifact::{ArtifactKind, MediaKind};
pub use detection::{BoundingBox, Detection, FrameRecord, ImageDetections, RawBox};
pub use threshold::{ThresholdConfig, ThresholdError};
