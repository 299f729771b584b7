//! Detection engine seams.
//!
//! The engine is an external capability: given a frame and thresholds it
//! returns candidate boxes that already passed its own confidence and IoU
//! suppression. Area filtering happens downstream in [`super::filter`].

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use vdet_models::{RawBox, ThresholdConfig};

use super::class_names::ClassNames;
use crate::error::MediaResult;
use crate::source::Frame;

/// A loaded detection model.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in `frame`, forwarding confidence, IoU and input size.
    ///
    /// Boxes are in frame pixel coordinates, in the engine's emission order.
    async fn detect(&self, frame: &Frame, thresholds: &ThresholdConfig) -> MediaResult<Vec<RawBox>>;

    /// Index to name table shipped with the model.
    fn class_names(&self) -> &ClassNames;

    /// Engine name for logging.
    fn name(&self) -> &'static str;
}

/// Loads a model artifact into a fresh detector instance.
#[async_trait]
pub trait DetectorLoader: Send + Sync {
    async fn load(&self, model_path: &Path) -> MediaResult<Arc<dyn ObjectDetector>>;
}
