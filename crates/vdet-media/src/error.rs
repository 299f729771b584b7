//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while staging, decoding or detecting.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    /// Upload could not be copied to temporary storage.
    #[error("Staging failed: {message}")]
    Staging {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Media is corrupt, unsupported or has no decodable stream.
    #[error("Cannot open media: {0}")]
    MediaOpen(String),

    /// Model artifact could not be loaded.
    #[error("Cannot load model: {0}")]
    ModelLoad(String),

    /// A frame failed to decode after streaming started.
    #[error("Frame decode failed: {0}")]
    FrameDecode(String),

    /// The detection engine failed on a frame.
    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create a staging failure from an I/O error.
    pub fn staging(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Staging {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a staging failure without an underlying I/O error.
    pub fn staging_msg(message: impl Into<String>) -> Self {
        Self::Staging {
            message: message.into(),
            source: None,
        }
    }

    /// Create a media open error.
    pub fn media_open(message: impl Into<String>) -> Self {
        Self::MediaOpen(message.into())
    }

    /// Create a model load error.
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    /// Create a frame decode error.
    pub fn frame_decode(message: impl Into<String>) -> Self {
        Self::FrameDecode(message.into())
    }

    /// Create a detection failure error.
    pub fn detection(message: impl Into<String>) -> Self {
        Self::Detection(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True when staging ran out of disk space.
    pub fn is_storage_exhausted(&self) -> bool {
        match self {
            MediaError::Staging {
                source: Some(e), ..
            } => e.kind() == std::io::ErrorKind::StorageFull || e.raw_os_error() == Some(28),
            _ => false,
        }
    }

    /// Short machine-readable code for error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => "tool_missing",
            MediaError::FfprobeFailed { .. } | MediaError::MediaOpen(_) => "media_open",
            MediaError::Staging { .. } => "staging",
            MediaError::ModelLoad(_) => "model_load",
            MediaError::FrameDecode(_) => "frame_decode",
            MediaError::Detection(_) => "detection",
            MediaError::FileNotFound(_) => "file_not_found",
            MediaError::Cancelled => "cancelled",
            MediaError::Io(_) | MediaError::Json(_) | MediaError::Internal(_) => "internal",
        }
    }
}
