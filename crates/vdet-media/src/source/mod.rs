//! Frame sources over staged media files.
//!
//! A [`FrameSource`] yields raster frames in presentation order with a
//! monotonically increasing index starting at 0. `Ok(None)` is end of
//! stream; an `Err` is a decode failure.

mod still;
mod video;

pub use self::still::StillImageSource;
pub use self::video::FfmpegFrameSource;

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use async_trait::async_trait;
use vdet_models::MediaKind;

use crate::error::MediaResult;

/// A decoded RGB frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Position in the decoded sequence
    pub index: u64,
    /// Packed RGB pixels
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image: Arc::new(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Sequential frame decoder owned by a single request.
#[async_trait]
pub trait FrameSource: Send {
    /// Decode the next frame, or `None` once the media is exhausted.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;

    /// Nominal frame rate. Zero or non-finite values are replaced by the
    /// 30 fps default when timestamps are computed.
    fn frame_rate(&self) -> f64;

    /// Release the decode handle. Further calls return end of stream.
    async fn close(&mut self);
}

/// Opens staged media files as frame sources.
#[async_trait]
pub trait MediaOpener: Send + Sync {
    /// Open `path` as `kind`. Corrupt or unsupported media fails here.
    async fn open(&self, path: &Path, kind: MediaKind) -> MediaResult<Box<dyn FrameSource>>;
}

/// Production opener: FFmpeg for video, the `image` crate for stills.
#[derive(Debug, Clone, Default)]
pub struct FfmpegMediaOpener;

impl FfmpegMediaOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaOpener for FfmpegMediaOpener {
    async fn open(&self, path: &Path, kind: MediaKind) -> MediaResult<Box<dyn FrameSource>> {
        match kind {
            MediaKind::Video => Ok(Box::new(FfmpegFrameSource::open(path).await?)),
            MediaKind::Image => Ok(Box::new(StillImageSource::open(path).await?)),
        }
    }
}
