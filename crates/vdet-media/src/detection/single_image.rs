//! Buffered detection for a single still image.

use vdet_models::{Detection, ThresholdConfig};
use tracing::debug;

use super::engine::ObjectDetector;
use super::filter::filter_detections;
use crate::error::{MediaError, MediaResult};
use crate::metrics;
use crate::source::FrameSource;

/// Detect on the first frame of `source` and return the filtered result.
///
/// No stride is applied. The source is closed on every path.
pub async fn detect_image(
    source: &mut dyn FrameSource,
    detector: &dyn ObjectDetector,
    thresholds: &ThresholdConfig,
) -> MediaResult<Vec<Detection>> {
    let result = detect_first_frame(source, detector, thresholds).await;
    source.close().await;
    result
}

async fn detect_first_frame(
    source: &mut dyn FrameSource,
    detector: &dyn ObjectDetector,
    thresholds: &ThresholdConfig,
) -> MediaResult<Vec<Detection>> {
    let frame = source
        .next_frame()
        .await?
        .ok_or_else(|| MediaError::media_open("Image contains no frame"))?;

    let started = std::time::Instant::now();
    let raw = detector.detect(&frame, thresholds).await?;
    metrics::record_frame_processed(detector.name(), started.elapsed().as_secs_f64());

    let detections = filter_detections(
        &raw,
        frame.width(),
        frame.height(),
        thresholds.max_area_ratio,
        detector.class_names(),
    );
    metrics::record_filtered(detections.len(), raw.len() - detections.len());

    debug!(
        width = frame.width(),
        height = frame.height(),
        raw = raw.len(),
        kept = detections.len(),
        "Image detection completed"
    );
    Ok(detections)
}
