//! Single still image as a one-frame source.

use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tracing::debug;

use super::{Frame, FrameSource};
use crate::error::{MediaError, MediaResult};
use crate::probe::DEFAULT_FRAME_RATE;

/// Yields exactly one frame, then end of stream.
#[derive(Debug)]
pub struct StillImageSource {
    image: Option<RgbImage>,
}

impl StillImageSource {
    /// Decode the image at `path`, sniffing the format from its content.
    pub async fn open(path: &Path) -> MediaResult<Self> {
        let path = path.to_path_buf();
        let image = tokio::task::spawn_blocking(move || decode_rgb(&path))
            .await
            .map_err(|e| MediaError::internal(format!("Image decode task failed: {}", e)))??;

        debug!(width = image.width(), height = image.height(), "Image opened");
        Ok(Self::from_image(image))
    }

    /// Wrap an already decoded image.
    pub fn from_image(image: RgbImage) -> Self {
        Self { image: Some(image) }
    }
}

fn decode_rgb(path: &Path) -> MediaResult<RgbImage> {
    let reader = image::io::Reader::open(path)
        .map_err(|e| MediaError::media_open(format!("Failed to read image: {}", e)))?
        .with_guessed_format()
        .map_err(|e| MediaError::media_open(format!("Failed to sniff image format: {}", e)))?;

    let decoded = reader
        .decode()
        .map_err(|e| MediaError::media_open(format!("Unsupported or corrupt image: {}", e)))?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(MediaError::media_open("Image has zero area"));
    }

    Ok(decoded.to_rgb8())
}

#[async_trait]
impl FrameSource for StillImageSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        Ok(self.image.take().map(|image| Frame::new(0, image)))
    }

    fn frame_rate(&self) -> f64 {
        DEFAULT_FRAME_RATE
    }

    async fn close(&mut self) {
        self.image = None;
    }
}
