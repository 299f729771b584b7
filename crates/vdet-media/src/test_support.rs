//! Fakes shared by the unit tests of this crate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{stream, Stream};
use image::RgbImage;
use vdet_models::{ArtifactKind, RawBox, ThresholdConfig};

use crate::detection::{ClassNames, ObjectDetector};
use crate::error::{MediaError, MediaResult};
use crate::source::{Frame, FrameSource};
use crate::staging::{ArtifactStore, ArtifactWriter, TempDirStore};

/// Store that writes real files but records every create/remove call.
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub dir: Option<tempfile::TempDir>,
    pub created: Mutex<Vec<PathBuf>>,
    pub removed: Mutex<Vec<PathBuf>>,
    pub fail_remove: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            dir: Some(tempfile::TempDir::new().unwrap()),
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn create(
        &self,
        kind: ArtifactKind,
        extension: &str,
    ) -> std::io::Result<(PathBuf, ArtifactWriter)> {
        let dir = self.dir.as_ref().unwrap().path();
        let (path, writer) = TempDirStore::new(dir).create(kind, extension).await?;
        self.created.lock().unwrap().push(path.clone());
        Ok((path, writer))
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        if self.fail_remove {
            return Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        }
        std::fs::remove_file(path)
    }
}

pub(crate) fn chunks(
    parts: &[&'static [u8]],
) -> impl Stream<Item = Result<&'static [u8], String>> + Unpin {
    stream::iter(parts.iter().map(|p| Ok::<_, String>(*p)).collect::<Vec<_>>())
}

/// Frame source yielding `total` blank frames.
pub(crate) struct SyntheticSource {
    pub width: u32,
    pub height: u32,
    pub total: u64,
    pub fps: f64,
    pub fail_at: Option<u64>,
    pub next: u64,
    pub decoded: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
}

impl SyntheticSource {
    pub fn new(total: u64, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            total,
            fps: 30.0,
            fail_at: None,
            next: 0,
            decoded: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.closed.load(Ordering::SeqCst) || self.next >= self.total {
            return Ok(None);
        }
        if self.fail_at == Some(self.next) {
            return Err(MediaError::frame_decode(format!("corrupt frame {}", self.next)));
        }
        let frame = Frame::new(self.next, RgbImage::new(self.width, self.height));
        self.next += 1;
        self.decoded.fetch_add(1, Ordering::SeqCst);
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Deterministic detector returning the same boxes for every frame.
pub(crate) struct ScriptedDetector {
    pub boxes: Vec<RawBox>,
    pub names: ClassNames,
    pub fail_on_call: Option<usize>,
    pub calls: Arc<AtomicUsize>,
    pub seen_frames: Mutex<Vec<u64>>,
}

impl ScriptedDetector {
    pub fn new(boxes: Vec<RawBox>) -> Self {
        Self {
            boxes,
            names: ClassNames::coco(),
            fail_on_call: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_frames: Mutex::new(Vec::new()),
        }
    }

    /// One box covering `fraction` of a `width` x `height` frame.
    pub fn covering(fraction: f64, width: u32, height: u32) -> Self {
        let box_width = f64::from(width) * fraction;
        Self::new(vec![RawBox {
            x1: 0.0,
            y1: 0.0,
            x2: box_width as f32,
            y2: height as f32,
            confidence: 0.9,
            class_id: 0,
        }])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectDetector for ScriptedDetector {
    async fn detect(&self, frame: &Frame, _thresholds: &ThresholdConfig) -> MediaResult<Vec<RawBox>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_frames.lock().unwrap().push(frame.index);
        if self.fail_on_call == Some(call) {
            return Err(MediaError::detection("engine crashed"));
        }
        Ok(self.boxes.clone())
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
