//! Application state.

use std::sync::Arc;

use tokio::sync::watch;

use vdet_media::{
    ArtifactStore, DetectorLoader, FfmpegMediaOpener, MediaOpener, OnnxDetectorLoader,
    TempDirStore,
};

use crate::config::ApiConfig;

/// Shared application state.
///
/// Holds only collaborator factories; every request stages its own files,
/// loads its own detector and opens its own frame source.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: Arc<dyn ArtifactStore>,
    pub opener: Arc<dyn MediaOpener>,
    pub loader: Arc<dyn DetectorLoader>,
    /// Flips to `true` when the server starts shutting down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Create production state: staged files under `work_dir`, FFmpeg
    /// decoding and ONNX Runtime detection.
    pub fn new(config: ApiConfig, shutdown: watch::Receiver<bool>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)?;
        let store = Arc::new(TempDirStore::new(config.work_dir.clone()));

        Ok(Self::with_components(
            config,
            store,
            Arc::new(FfmpegMediaOpener::new()),
            Arc::new(OnnxDetectorLoader::new()),
            shutdown,
        ))
    }

    /// Assemble state from explicit collaborators.
    pub fn with_components(
        config: ApiConfig,
        store: Arc<dyn ArtifactStore>,
        opener: Arc<dyn MediaOpener>,
        loader: Arc<dyn DetectorLoader>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            store,
            opener,
            loader,
            shutdown,
        }
    }
}
