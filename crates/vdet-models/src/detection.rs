//! Detection records exchanged with clients.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in integer pixel units, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }
}

/// A single filtered detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub class_name: String,
    pub class_id: usize,
}

/// Unfiltered candidate box as returned by the detection engine.
///
/// Coordinates are corner format in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawBox {
    /// Real-valued width, before any truncation.
    pub fn width(&self) -> f64 {
        f64::from(self.x2) - f64::from(self.x1)
    }

    /// Real-valued height, before any truncation.
    pub fn height(&self) -> f64 {
        f64::from(self.y2) - f64::from(self.y1)
    }

    /// Real-valued area.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

/// Detections for one sampled frame of a video stream.
///
/// Serialized as one NDJSON line. Consumers must expect gaps in
/// `frame_number` when a frame stride above 1 is in effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    pub frame_number: u64,
    /// Presentation time in seconds (`frame_number / frame_rate`)
    #[serde(rename = "timestamp")]
    pub timestamp_seconds: f64,
    pub detections: Vec<Detection>,
}

impl FrameRecord {
    /// Build a record, deriving the timestamp from the frame rate.
    pub fn new(frame_number: u64, frame_rate: f64, detections: Vec<Detection>) -> Self {
        Self {
            frame_number,
            timestamp_seconds: frame_number as f64 / frame_rate,
            detections,
        }
    }

    /// Serialize as a single newline-terminated JSON line.
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Response body of the single-image endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageDetections {
    pub detections: Vec<Detection>,
}
