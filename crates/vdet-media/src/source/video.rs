//! Video frames decoded by an FFmpeg child process.

use std::collections::VecDeque;
use std::path::Path;

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Frame, FrameSource};
use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::probe::{probe_video, VideoInfo};

/// Lines of decoder stderr kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

type FrameReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streams RGB24 frames from `ffmpeg -f rawvideo` over a pipe.
pub struct FfmpegFrameSource {
    width: u32,
    height: u32,
    fps: f64,
    frame_bytes: usize,
    reader: Option<FrameReader>,
    child: Option<Child>,
    stderr_tail: Option<JoinHandle<String>>,
    next_index: u64,
}

impl FfmpegFrameSource {
    /// Probe and start decoding `path`.
    pub async fn open(path: &Path) -> MediaResult<Self> {
        let info = probe_video(path).await.map_err(|e| match e {
            MediaError::FfprobeFailed { message, stderr } => MediaError::media_open(format!(
                "{}: {}",
                message,
                stderr.unwrap_or_default().trim()
            )),
            other => other,
        })?;

        let mut child = FfmpegCommand::new(path).no_autorotate().raw_rgb24().spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        info!(
            width = info.width,
            height = info.height,
            fps = info.fps(),
            codec = %info.codec,
            "Video opened"
        );

        let mut source = Self::from_reader(&info, Box::new(stdout));
        source.child = Some(child);
        source.stderr_tail = Some(tokio::spawn(collect_stderr_tail(stderr)));
        Ok(source)
    }

    /// Decode raw RGB24 frames of the probed size from any reader.
    pub(crate) fn from_reader(info: &VideoInfo, reader: FrameReader) -> Self {
        Self {
            width: info.width,
            height: info.height,
            fps: info.fps(),
            frame_bytes: info.width as usize * info.height as usize * 3,
            reader: Some(reader),
            child: None,
            stderr_tail: None,
            next_index: 0,
        }
    }

    /// Reap the decoder after its output is exhausted.
    async fn finish(&mut self) -> MediaResult<()> {
        self.reader = None;

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .await
            .map_err(|e| MediaError::frame_decode(format!("FFmpeg process error: {}", e)))?;

        if status.success() {
            debug!(frames = self.next_index, "Decoder finished");
            return Ok(());
        }

        let tail = match self.stderr_tail.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => String::new(),
        };
        Err(MediaError::frame_decode(format!(
            "FFmpeg exited with {} after {} frames: {}",
            status,
            self.next_index,
            tail.trim()
        )))
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_bytes];
        let filled = read_full(reader, &mut buf)
            .await
            .map_err(|e| MediaError::frame_decode(format!("Failed to read frame: {}", e)))?;

        if filled == 0 {
            self.finish().await?;
            return Ok(None);
        }

        if filled < self.frame_bytes {
            self.reader = None;
            return Err(MediaError::frame_decode(format!(
                "Truncated frame {}: got {} of {} bytes",
                self.next_index, filled, self.frame_bytes
            )));
        }

        let image = RgbImage::from_raw(self.width, self.height, buf)
            .ok_or_else(|| MediaError::frame_decode("Frame buffer size mismatch"))?;

        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(Some(frame))
    }

    fn frame_rate(&self) -> f64 {
        self.fps
    }

    async fn close(&mut self) {
        self.reader = None;
        if let Some(mut child) = self.child.take() {
            // Already exited when the stream ran to completion
            let _ = child.kill().await;
        }
        if let Some(handle) = self.stderr_tail.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for FfmpegFrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegFrameSource")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fps", &self.fps)
            .field("next_index", &self.next_index)
            .finish()
    }
}

/// Fill `buf` until it is full or the reader hits EOF.
async fn read_full<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn collect_stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Vec::from(tail).join("\n")
}
