//! Object detection for streamed and single-image requests.
//!
//! | Stage | Module |
//! |-------|--------|
//! | Engine seam | `engine` (`ObjectDetector`, `DetectorLoader`) |
//! | YOLOv8 ONNX engine | `object_detector` |
//! | Area-ratio filter | `filter` |
//! | NDJSON emitter | `stream` |
//! | Still image | `single_image` |

pub mod class_names;
pub mod engine;
pub mod filter;
pub mod object_detector;
pub mod single_image;
pub mod stream;

pub use class_names::{ClassNames, COCO_CLASSES};
pub use engine::{DetectorLoader, ObjectDetector};
pub use filter::filter_detections;
pub use object_detector::{OnnxDetectorLoader, YoloOnnxDetector, MAX_DETECTIONS};
pub use single_image::detect_image;
pub use stream::{FrameStreamer, RecordSender, StreamOutcome, StreamState, StreamSummary};
