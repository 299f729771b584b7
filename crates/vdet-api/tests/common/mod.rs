//! Fakes and request builders shared by the API integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use image::RgbImage;
use tokio::sync::watch;

use vdet_api::{create_router, ApiConfig, AppState};
use vdet_media::detection::ClassNames;
use vdet_media::{
    ArtifactStore, ArtifactWriter, DetectorLoader, Frame, FrameSource, MediaError, MediaOpener,
    MediaResult, ObjectDetector, TempDirStore,
};
use vdet_models::{ArtifactKind, MediaKind, RawBox, ThresholdConfig};

pub const BOUNDARY: &str = "vdet-test-boundary";

/// Store backed by a temp dir that records every create/remove call.
pub struct RecordingStore {
    dir: tempfile::TempDir,
    fail_create_os_error: Option<i32>,
    created: Mutex<Vec<PathBuf>>,
    removed: Mutex<Vec<PathBuf>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            dir: tempfile::TempDir::new().unwrap(),
            fail_create_os_error: None,
            created: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    /// Every create fails with the given OS error code.
    pub fn failing(os_error: i32) -> Self {
        Self {
            fail_create_os_error: Some(os_error),
            ..Self::new()
        }
    }

    pub fn created(&self) -> Vec<PathBuf> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<PathBuf> {
        self.removed.lock().unwrap().clone()
    }

    /// Files still on disk.
    pub fn leftovers(&self) -> usize {
        std::fs::read_dir(self.dir.path()).unwrap().count()
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn create(
        &self,
        kind: ArtifactKind,
        extension: &str,
    ) -> std::io::Result<(PathBuf, ArtifactWriter)> {
        if let Some(code) = self.fail_create_os_error {
            return Err(std::io::Error::from_raw_os_error(code));
        }
        let (path, writer) = TempDirStore::new(self.dir.path()).create(kind, extension).await?;
        self.created.lock().unwrap().push(path.clone());
        Ok((path, writer))
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.removed.lock().unwrap().push(path.to_path_buf());
        std::fs::remove_file(path)
    }
}

/// Source yielding blank frames.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    total: u64,
    fps: f64,
    fail_at: Option<u64>,
    next: u64,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.next >= self.total {
            return Ok(None);
        }
        if self.fail_at == Some(self.next) {
            return Err(MediaError::frame_decode("corrupt packet"));
        }
        let frame = Frame::new(self.next, RgbImage::new(self.width, self.height));
        self.next += 1;
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    async fn close(&mut self) {
        self.total = 0;
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Opened media as seen by the opener.
#[derive(Debug, Clone)]
pub struct OpenedMedia {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

/// Opener producing synthetic frames for any staged file.
///
/// Sources report a rate of 0 unless `fps` is set.
pub struct FakeOpener {
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub fail_at: Option<u64>,
    pub reject: bool,
    pub opened: Mutex<Vec<OpenedMedia>>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeOpener {
    pub fn new(frames: u64) -> Self {
        Self {
            frames,
            width: 100,
            height: 100,
            fps: 0.0,
            fail_at: None,
            reject: false,
            opened: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn opened(&self) -> Vec<OpenedMedia> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaOpener for FakeOpener {
    async fn open(&self, path: &Path, kind: MediaKind) -> MediaResult<Box<dyn FrameSource>> {
        if self.reject {
            return Err(MediaError::media_open("unsupported codec"));
        }
        self.opened.lock().unwrap().push(OpenedMedia {
            kind,
            path: path.to_path_buf(),
            bytes: std::fs::read(path)?,
        });

        let total = match kind {
            MediaKind::Video => self.frames,
            MediaKind::Image => 1,
        };
        Ok(Box::new(SyntheticSource {
            width: self.width,
            height: self.height,
            total,
            fps: self.fps,
            fail_at: self.fail_at,
            next: 0,
            closed: self.closed.clone(),
        }))
    }
}

/// Detector returning one box covering `fraction` of the frame width at
/// full height.
pub struct FakeDetector {
    fraction: f64,
    names: ClassNames,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ObjectDetector for FakeDetector {
    async fn detect(&self, frame: &Frame, _thresholds: &ThresholdConfig) -> MediaResult<Vec<RawBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![RawBox {
            x1: 0.0,
            y1: 0.0,
            x2: (f64::from(frame.width()) * self.fraction) as f32,
            y2: frame.height() as f32,
            confidence: 0.9,
            class_id: 2,
        }])
    }

    fn class_names(&self) -> &ClassNames {
        &self.names
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeLoader {
    pub fraction: f64,
    pub reject: bool,
    pub loaded: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    pub detect_calls: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            reject: false,
            loaded: Mutex::new(Vec::new()),
            detect_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub fn loaded(&self) -> Vec<(PathBuf, Vec<u8>)> {
        self.loaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl DetectorLoader for FakeLoader {
    async fn load(&self, model_path: &Path) -> MediaResult<Arc<dyn ObjectDetector>> {
        if self.reject {
            return Err(MediaError::model_load("not an ONNX model"));
        }
        self.loaded
            .lock()
            .unwrap()
            .push((model_path.to_path_buf(), std::fs::read(model_path)?));
        Ok(Arc::new(FakeDetector {
            fraction: self.fraction,
            names: ClassNames::coco(),
            calls: self.detect_calls.clone(),
        }))
    }
}

/// Router wired to fakes, plus handles for assertions.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<RecordingStore>,
    pub opener: Arc<FakeOpener>,
    pub loader: Arc<FakeLoader>,
    pub shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub fn new(store: RecordingStore, opener: FakeOpener, loader: FakeLoader) -> Self {
        Self::with_config(ApiConfig::default(), store, opener, loader)
    }

    pub fn with_config(
        config: ApiConfig,
        store: RecordingStore,
        opener: FakeOpener,
        loader: FakeLoader,
    ) -> Self {
        let store = Arc::new(store);
        let opener = Arc::new(opener);
        let loader = Arc::new(loader);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let state = AppState::with_components(
            config,
            store.clone(),
            opener.clone(),
            loader.clone(),
            shutdown_rx,
        );

        Self {
            router: create_router(state, None),
            store,
            opener,
            loader,
            shutdown,
        }
    }
}

/// One multipart part: (field name, file name, content).
pub type Part<'a> = (&'a str, &'a str, &'a [u8]);

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Parse an NDJSON body into JSON values, one per line.
pub fn ndjson_lines(body: &[u8]) -> Vec<serde_json::Value> {
    let text = std::str::from_utf8(body).unwrap();
    assert!(text.is_empty() || text.ends_with('\n'), "unterminated line: {:?}", text);
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
