//! Per-request detection thresholds.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Threshold validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThresholdError {
    #[error("confidence threshold must be within [0, 1], got {0}")]
    Confidence(f32),

    #[error("IoU threshold must be within [0, 1], got {0}")]
    Iou(f32),

    #[error("input size must be positive")]
    InputSize,

    #[error("frame stride must be at least 1")]
    FrameStride,

    #[error("max area ratio must be positive, got {0}")]
    MaxAreaRatio(f64),
}

/// Thresholds threaded through every detection call of a request.
///
/// A request copies this value once and never mutates it while streaming.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    /// Minimum class confidence kept by the engine
    pub confidence_threshold: f32,
    /// IoU above which overlapping same-class boxes are suppressed
    pub iou_threshold: f32,
    /// Square model input dimension
    pub input_size: u32,
    /// Process every Nth frame
    pub frame_stride: u32,
    /// Boxes covering more than this fraction of the frame are rejected
    pub max_area_ratio: f64,
}

impl ThresholdConfig {
    pub const DEFAULT_CONFIDENCE: f32 = 0.5;
    pub const DEFAULT_IOU: f32 = 0.6;
    pub const DEFAULT_INPUT_SIZE: u32 = 640;
    pub const DEFAULT_FRAME_STRIDE: u32 = 2;
    pub const DEFAULT_MAX_AREA_RATIO: f64 = 0.6;

    /// Check every threshold is usable.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ThresholdError::Confidence(self.confidence_threshold));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ThresholdError::Iou(self.iou_threshold));
        }
        if self.input_size == 0 {
            return Err(ThresholdError::InputSize);
        }
        if self.frame_stride == 0 {
            return Err(ThresholdError::FrameStride);
        }
        if !(self.max_area_ratio > 0.0) {
            return Err(ThresholdError::MaxAreaRatio(self.max_area_ratio));
        }
        Ok(())
    }

    /// Whether the frame at `index` goes through detection.
    pub fn samples(&self, index: u64) -> bool {
        index % u64::from(self.frame_stride.max(1)) == 0
    }

    /// Same thresholds with a different stride.
    pub fn with_frame_stride(mut self, frame_stride: u32) -> Self {
        self.frame_stride = frame_stride;
        self
    }

    /// Same thresholds with a different area ratio.
    pub fn with_max_area_ratio(mut self, max_area_ratio: f64) -> Self {
        self.max_area_ratio = max_area_ratio;
        self
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: Self::DEFAULT_CONFIDENCE,
            iou_threshold: Self::DEFAULT_IOU,
            input_size: Self::DEFAULT_INPUT_SIZE,
            frame_stride: Self::DEFAULT_FRAME_STRIDE,
            max_area_ratio: Self::DEFAULT_MAX_AREA_RATIO,
        }
    }
}
