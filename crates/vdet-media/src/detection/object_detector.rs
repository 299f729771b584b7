//! Object detection using YOLOv8-format ONNX models.
//!
//! Provides pluggable object detection with GPU acceleration support:
//! - CUDA on Linux with NVIDIA GPU (when the `cuda` feature is enabled)
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use ndarray::ArrayView2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info, warn};

use vdet_models::{RawBox, ThresholdConfig};

use super::class_names::ClassNames;
use super::engine::{DetectorLoader, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use crate::source::Frame;

/// Upper bound on boxes returned per frame.
pub const MAX_DETECTIONS: usize = 300;

/// Model metadata key holding the class table.
const NAMES_METADATA_KEY: &str = "names";

/// Object detector over one ONNX Runtime session.
///
/// Each request loads its own instance; the session mutex only serialises
/// the blocking inference calls of that request.
pub struct YoloOnnxDetector {
    session: Arc<Mutex<Session>>,
    class_names: ClassNames,
}

impl YoloOnnxDetector {
    /// Load a model from disk. Blocking.
    pub fn load(model_path: &Path) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_load(format!(
                "Model file not found: {}",
                model_path.display()
            )));
        }

        let session = create_session(model_path)?;
        let class_names = read_class_names(&session);

        info!(
            model_path = %model_path.display(),
            classes = class_names.len(),
            "Object detector initialized"
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            class_names,
        })
    }
}

#[async_trait]
impl ObjectDetector for YoloOnnxDetector {
    async fn detect(&self, frame: &Frame, thresholds: &ThresholdConfig) -> MediaResult<Vec<RawBox>> {
        let session = Arc::clone(&self.session);
        let image = Arc::clone(&frame.image);
        let thresholds = *thresholds;

        tokio::task::spawn_blocking(move || run_detection(&session, &image, &thresholds))
            .await
            .map_err(|e| MediaError::detection(format!("Detection task failed: {}", e)))?
    }

    fn class_names(&self) -> &ClassNames {
        &self.class_names
    }

    fn name(&self) -> &'static str {
        "yolo-onnx"
    }
}

/// Loads [`YoloOnnxDetector`] instances off the async runtime.
#[derive(Debug, Clone, Default)]
pub struct OnnxDetectorLoader;

impl OnnxDetectorLoader {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DetectorLoader for OnnxDetectorLoader {
    async fn load(&self, model_path: &Path) -> MediaResult<Arc<dyn ObjectDetector>> {
        let path = model_path.to_path_buf();
        let detector = tokio::task::spawn_blocking(move || YoloOnnxDetector::load(&path))
            .await
            .map_err(|e| MediaError::model_load(format!("Model load task failed: {}", e)))??;
        Ok(Arc::new(detector))
    }
}

fn run_detection(
    session: &Mutex<Session>,
    image: &RgbImage,
    thresholds: &ThresholdConfig,
) -> MediaResult<Vec<RawBox>> {
    let input_size = thresholds.input_size;
    let chw = preprocess(image, input_size);

    let shape = vec![1usize, 3, input_size as usize, input_size as usize];
    let input = Tensor::from_array((shape, chw.into_boxed_slice()))
        .map(Value::from)
        .map_err(|e| MediaError::detection(format!("Failed to create tensor: {}", e)))?;

    let (dims, output) = run_inference(session, input)?;

    let candidates = decode_output(&dims, &output, image.width(), image.height(), thresholds)?;
    let detections = non_maximum_suppression(candidates, thresholds.iou_threshold);

    debug!(count = detections.len(), "Object detection completed");
    Ok(detections)
}

/// Gray used for letterbox padding, as in Ultralytics exports.
const PAD_VALUE: u8 = 114;

/// Mapping between frame pixels and the square model input.
///
/// The frame is scaled uniformly to fit `input_size` and centred, so aspect
/// ratio is preserved and boxes map back with one scale and two offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(frame_width: u32, frame_height: u32, input_size: u32) -> Self {
        let size = input_size as f32;
        let scale = (size / frame_width.max(1) as f32).min(size / frame_height.max(1) as f32);
        let width = ((frame_width as f32 * scale).round() as u32).clamp(1, input_size);
        let height = ((frame_height as f32 * scale).round() as u32).clamp(1, input_size);

        Self {
            scale,
            width,
            height,
            pad_x: (input_size - width) / 2,
            pad_y: (input_size - height) / 2,
        }
    }

    /// Input-space point back to frame pixels.
    fn to_frame(self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

/// Letterbox to a square input and lay out as normalized CHW floats.
fn preprocess(image: &RgbImage, input_size: u32) -> Vec<f32> {
    let letterbox = Letterbox::fit(image.width(), image.height(), input_size);
    let resized = image::imageops::resize(
        image,
        letterbox.width,
        letterbox.height,
        FilterType::Triangle,
    );
    let mut canvas = RgbImage::from_pixel(input_size, input_size, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.pad_x),
        i64::from(letterbox.pad_y),
    );

    let (w, h) = (input_size as usize, input_size as usize);
    let mut chw = vec![0.0f32; 3 * h * w];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..3 {
            chw[c * h * w + offset] = f32::from(pixel[c]) / 255.0;
        }
    }
    chw
}

/// Run ONNX inference and copy out the first output tensor.
fn run_inference(session: &Mutex<Session>, input: Value) -> MediaResult<(Vec<usize>, Vec<f32>)> {
    let mut session = session
        .lock()
        .map_err(|_| MediaError::internal("Session lock poisoned"))?;

    let output_name = session
        .outputs
        .first()
        .map(|o| o.name.clone())
        .ok_or_else(|| MediaError::detection("Model declares no outputs"))?;

    let outputs = session
        .run(ort::inputs![input])
        .map_err(|e| MediaError::detection(format!("ONNX inference failed: {}", e)))?;

    let output = outputs
        .get(output_name.as_str())
        .ok_or_else(|| MediaError::detection(format!("Missing {} tensor", output_name)))?;

    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| MediaError::detection(format!("Failed to extract tensor: {}", e)))?;

    let dims = shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok((dims, data.to_vec()))
}

/// Decode a YOLOv8 head output of shape `[1, 4 + classes, candidates]`.
///
/// Each candidate is `(cx, cy, w, h)` in input pixels followed by one score
/// per class. Candidates whose best score does not exceed the confidence
/// threshold are dropped; the rest are scaled to frame pixels and clipped.
fn decode_output(
    dims: &[usize],
    output: &[f32],
    frame_width: u32,
    frame_height: u32,
    thresholds: &ThresholdConfig,
) -> MediaResult<Vec<RawBox>> {
    let (num_features, num_boxes) = match dims {
        [1, f, n] if *f > 4 => (*f, *n),
        _ => {
            return Err(MediaError::detection(format!(
                "Unexpected output shape {:?}, expected [1, 4 + classes, candidates]",
                dims
            )))
        }
    };

    let view = ArrayView2::from_shape((num_features, num_boxes), output)
        .map_err(|e| MediaError::detection(format!("Failed to reshape output: {}", e)))?;

    let letterbox = Letterbox::fit(frame_width, frame_height, thresholds.input_size);
    let max_x = frame_width as f32;
    let max_y = frame_height as f32;

    let mut candidates = Vec::new();
    for i in 0..num_boxes {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for c in 4..num_features {
            let score = view[[c, i]];
            if score > best_score {
                best_score = score;
                best_class = c - 4;
            }
        }

        if best_score <= thresholds.confidence_threshold {
            continue;
        }

        let cx = view[[0, i]];
        let cy = view[[1, i]];
        let w = view[[2, i]];
        let h = view[[3, i]];

        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);

        candidates.push(RawBox {
            x1: x1.clamp(0.0, max_x),
            y1: y1.clamp(0.0, max_y),
            x2: x2.clamp(0.0, max_x),
            y2: y2.clamp(0.0, max_y),
            confidence: best_score,
            class_id: best_class,
        });
    }

    Ok(candidates)
}

/// Class-aware Non-Maximum Suppression.
///
/// Returns at most [`MAX_DETECTIONS`] boxes in descending confidence order.
fn non_maximum_suppression(mut detections: Vec<RawBox>, iou_threshold: f32) -> Vec<RawBox> {
    if detections.is_empty() {
        return detections;
    }

    // Sort by confidence (descending), stable for equal scores
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(detections[i]);
        if keep.len() == MAX_DETECTIONS {
            break;
        }

        for j in (i + 1)..detections.len() {
            if suppressed[j] || detections[i].class_id != detections[j].class_id {
                continue;
            }
            if compute_iou(&detections[i], &detections[j]) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Intersection over Union of two corner-format boxes.
fn compute_iou(a: &RawBox, b: &RawBox) -> f32 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Read the class table from model metadata, defaulting to COCO.
fn read_class_names(session: &Session) -> ClassNames {
    match session
        .metadata()
        .and_then(|metadata| metadata.custom(NAMES_METADATA_KEY))
    {
        Ok(Some(text)) => ClassNames::parse_metadata(&text).unwrap_or_else(|| {
            warn!("Unparseable class names metadata, using COCO classes");
            ClassNames::coco()
        }),
        Ok(None) => {
            debug!("Model has no class names metadata, using COCO classes");
            ClassNames::coco()
        }
        Err(e) => {
            warn!(error = %e, "Failed to read model metadata, using COCO classes");
            ClassNames::coco()
        }
    }
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::model_load(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::model_load(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::model_load(format!("Failed to set optimization level: {}", e)))?;

    // Try CUDA on Linux with cuda feature
    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    // CPU fallback
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::model_load(format!("Failed to load ONNX model: {}", e)))
}
