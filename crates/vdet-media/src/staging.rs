//! Request-scoped staging of uploaded artifacts on disk.
//!
//! Every upload is copied byte-for-byte into a uniquely named file. The
//! [`ArtifactStager`] owns those files for the lifetime of one request and
//! removes them when released or dropped, whichever comes first. Removal
//! failures are logged and never propagated.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use vdet_models::{ArtifactKind, MediaKind};

use crate::error::{MediaError, MediaResult};

/// Extension for staged model artifacts.
pub const MODEL_EXTENSION: &str = "onnx";

/// Longest upload extension kept as-is.
const MAX_EXTENSION_LEN: usize = 8;

/// Writer for the contents of a freshly created artifact file.
pub type ArtifactWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Backing storage for staged artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create a new uniquely named file ending in `.{extension}`.
    async fn create(
        &self,
        kind: ArtifactKind,
        extension: &str,
    ) -> std::io::Result<(PathBuf, ArtifactWriter)>;

    /// Remove a previously created file.
    fn remove(&self, path: &Path) -> std::io::Result<()>;
}

/// Artifact store backed by a local directory.
#[derive(Debug, Clone)]
pub struct TempDirStore {
    dir: PathBuf,
}

impl TempDirStore {
    /// Store files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store files under the OS temporary directory.
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ArtifactStore for TempDirStore {
    async fn create(
        &self,
        kind: ArtifactKind,
        extension: &str,
    ) -> std::io::Result<(PathBuf, ArtifactWriter)> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let prefix = format!("vdet-{}-", kind);
        let suffix = format!(".{}", extension);
        let (file, path) = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?
            .keep()
            .map_err(|e| e.error)?;

        Ok((path, Box::pin(tokio::fs::File::from_std(file))))
    }

    fn remove(&self, path: &Path) -> std::io::Result<()> {
        std::fs::remove_file(path)
    }
}

/// A file owned by the stager.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Owns the staged files of one request.
pub struct ArtifactStager {
    store: Arc<dyn ArtifactStore>,
    staged: Vec<StagedFile>,
}

impl ArtifactStager {
    /// Create an empty stager on top of `store`.
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            staged: Vec::new(),
        }
    }

    /// Copy an upload into a new file and register it for cleanup.
    ///
    /// The file is registered before the copy starts, so a partially
    /// written file is removed like any other.
    pub async fn stage<S, B, E>(
        &mut self,
        kind: ArtifactKind,
        extension: &str,
        mut chunks: S,
    ) -> MediaResult<PathBuf>
    where
        S: Stream<Item = Result<B, E>> + Unpin + Send,
        B: AsRef<[u8]>,
        E: Display,
    {
        let (path, mut writer) = self
            .store
            .create(kind, extension)
            .await
            .map_err(|e| MediaError::staging(format!("Failed to allocate {} file", kind), e))?;

        self.staged.push(StagedFile {
            kind,
            path: path.clone(),
            bytes: 0,
        });

        let mut written: u64 = 0;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| {
                MediaError::staging_msg(format!("Failed to read {} upload: {}", kind, e))
            })?;
            let bytes = chunk.as_ref();
            writer
                .write_all(bytes)
                .await
                .map_err(|e| MediaError::staging(format!("Failed to write {} file", kind), e))?;
            written += bytes.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| MediaError::staging(format!("Failed to flush {} file", kind), e))?;

        if let Some(entry) = self.staged.last_mut() {
            entry.bytes = written;
        }

        debug!(kind = %kind, path = %path.display(), bytes = written, "Artifact staged");
        Ok(path)
    }

    /// Path of the most recently staged artifact of `kind`.
    pub fn path(&self, kind: ArtifactKind) -> Option<&Path> {
        self.staged
            .iter()
            .rev()
            .find(|f| f.kind == kind)
            .map(|f| f.path.as_path())
    }

    /// Files currently owned.
    pub fn files(&self) -> &[StagedFile] {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Remove every staged file. Safe to call more than once.
    ///
    /// Returns the number of files whose removal failed.
    pub fn release_all(&mut self) -> usize {
        let mut failures = 0;
        for file in self.staged.drain(..) {
            match self.store.remove(&file.path) {
                Ok(()) => {
                    debug!(kind = %file.kind, path = %file.path.display(), "Artifact removed");
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        kind = %file.kind,
                        path = %file.path.display(),
                        error = %e,
                        "Failed to remove staged artifact"
                    );
                }
            }
        }
        failures
    }
}

impl Drop for ArtifactStager {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl std::fmt::Debug for ArtifactStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStager")
            .field("staged", &self.staged)
            .finish()
    }
}

/// Extension for a staged media upload.
///
/// Keeps the upload's own extension when it is short and alphanumeric,
/// otherwise falls back to the default for `kind`.
pub fn media_extension(file_name: Option<&str>, kind: MediaKind) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| kind.default_extension().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chunks, RecordingStore};
    use futures_util::stream;

    #[tokio::test]
    async fn test_stage_copies_bytes_exactly() {
        let store = Arc::new(RecordingStore::new());
        let mut stager = ArtifactStager::new(store.clone());

        let model = stager
            .stage(ArtifactKind::Model, MODEL_EXTENSION, chunks(&[b"onnx", b"-weights"]))
            .await
            .unwrap();
        let media = stager
            .stage(ArtifactKind::Media, "mp4", chunks(&[b"\x00\x01\x02"]))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&model).unwrap(), b"onnx-weights");
        assert_eq!(std::fs::read(&media).unwrap(), vec![0u8, 1, 2]);
        assert_eq!(model.extension().unwrap(), "onnx");
        assert_eq!(media.extension().unwrap(), "mp4");
        assert_ne!(model, media);
        assert_eq!(stager.path(ArtifactKind::Model), Some(model.as_path()));
        assert_eq!(stager.files()[0].bytes, 12);
    }

    #[tokio::test]
    async fn test_release_all_removes_each_file_once() {
        let store = Arc::new(RecordingStore::new());
        let mut stager = ArtifactStager::new(store.clone());
        let a = stager.stage(ArtifactKind::Model, "onnx", chunks(&[b"m"])).await.unwrap();
        let b = stager.stage(ArtifactKind::Media, "jpg", chunks(&[b"i"])).await.unwrap();

        assert_eq!(stager.release_all(), 0);
        assert_eq!(stager.release_all(), 0);
        drop(stager);

        assert_eq!(store.created.lock().unwrap().len(), 2);
        assert_eq!(*store.removed.lock().unwrap(), vec![a.clone(), b.clone()]);
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_drop_releases_files() {
        let store = Arc::new(RecordingStore::new());
        let path = {
            let mut stager = ArtifactStager::new(store.clone());
            stager.stage(ArtifactKind::Media, "mp4", chunks(&[b"v"])).await.unwrap()
        };
        assert!(!path.exists());
        assert_eq!(store.removed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_upload_is_still_removed() {
        let store = Arc::new(RecordingStore::new());
        let mut stager = ArtifactStager::new(store.clone());

        let broken = stream::iter(vec![
            Ok::<&[u8], String>(b"partial"),
            Err("connection reset".to_string()),
        ]);
        let err = stager
            .stage(ArtifactKind::Media, "mp4", broken)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Staging { .. }));
        assert_eq!(stager.len(), 1);

        drop(stager);
        assert_eq!(store.created.lock().unwrap().len(), 1);
        assert_eq!(store.removed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_errors_are_swallowed() {
        let store = Arc::new(RecordingStore {
            fail_remove: true,
            ..RecordingStore::new()
        });
        let mut stager = ArtifactStager::new(store.clone());
        stager.stage(ArtifactKind::Model, "onnx", chunks(&[b"m"])).await.unwrap();
        stager.stage(ArtifactKind::Media, "mp4", chunks(&[b"v"])).await.unwrap();

        assert_eq!(stager.release_all(), 2);
        assert!(stager.is_empty());
        assert_eq!(store.removed.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_media_extension() {
        assert_eq!(media_extension(Some("clip.MOV"), MediaKind::Video), "mov");
        assert_eq!(media_extension(Some("frame12.png"), MediaKind::Image), "png");
        assert_eq!(media_extension(Some("noext"), MediaKind::Video), "mp4");
        assert_eq!(media_extension(None, MediaKind::Image), "jpg");
        assert_eq!(media_extension(Some("x.../etc"), MediaKind::Video), "mp4");
        assert_eq!(media_extension(Some("a.toolongextension"), MediaKind::Video), "mp4");
    }
}
