//! Incremental per-frame detection over a frame source.
//!
//! [`FrameStreamer`] drives `next_frame -> detect -> filter -> emit` for one
//! request and owns everything the request allocated: the decode handle,
//! the detector instance and the staged artifacts. Records are handed to
//! the transport one at a time through a bounded channel.
//!
//! ```text
//! Idle -> Streaming -> Draining -> Closed
//!                  \-> Failed   -> Closed
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use vdet_models::{FrameRecord, ThresholdConfig};

use super::engine::ObjectDetector;
use super::filter::filter_detections;
use crate::error::MediaResult;
use crate::metrics;
use crate::probe::effective_frame_rate;
use crate::source::FrameSource;
use crate::staging::ArtifactStager;

/// Channel carrying serialized NDJSON lines to the transport.
///
/// An `Err` item is sent once when the stream fails after it started.
pub type RecordSender = mpsc::Sender<MediaResult<String>>;

/// Emitter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Draining,
    Failed,
    Closed,
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The frame source was exhausted.
    Completed,
    /// The client went away or the server is shutting down.
    Cancelled,
    /// A decode or detection error ended the stream early.
    Failed { reason: String },
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters for one finished stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub outcome: StreamOutcome,
    pub frames_decoded: u64,
    pub frames_processed: u64,
    pub records_emitted: u64,
    pub detections_emitted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_decoded: u64,
    frames_processed: u64,
    records_emitted: u64,
    detections_emitted: u64,
}

enum LoopEnd {
    Exhausted,
    Cancelled,
}

/// Streams filtered detections for every sampled frame of one source.
pub struct FrameStreamer {
    source: Box<dyn FrameSource>,
    detector: Arc<dyn ObjectDetector>,
    thresholds: ThresholdConfig,
    stager: Option<ArtifactStager>,
    cancel: Option<watch::Receiver<bool>>,
    state: StreamState,
}

impl FrameStreamer {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Arc<dyn ObjectDetector>,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            source,
            detector,
            thresholds,
            stager: None,
            cancel: None,
            state: StreamState::Idle,
        }
    }

    /// Take ownership of the request's staged files; they are released
    /// when the stream closes.
    pub fn with_stager(mut self, stager: ArtifactStager) -> Self {
        self.stager = Some(stager);
        self
    }

    /// Stop between frames once `cancel` becomes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Run to completion, sending one line per sampled frame to `tx`.
    ///
    /// Cleanup runs before `tx` is dropped, so the transport only sees the
    /// end of the stream once the decode handle and staged files are gone.
    pub async fn run(mut self, tx: RecordSender) -> StreamSummary {
        self.transition(StreamState::Streaming);

        let mut counters = Counters::default();
        let frame_rate = effective_frame_rate(Some(self.source.frame_rate()));

        let (outcome, failure) = match self.pump(&tx, frame_rate, &mut counters).await {
            Ok(LoopEnd::Exhausted) => {
                self.transition(StreamState::Draining);
                (StreamOutcome::Completed, None)
            }
            Ok(LoopEnd::Cancelled) => {
                self.transition(StreamState::Draining);
                (StreamOutcome::Cancelled, None)
            }
            Err(e) => {
                self.transition(StreamState::Failed);
                let reason = e.to_string();
                (StreamOutcome::Failed { reason }, Some(e))
            }
        };

        self.release().await;

        if let Some(e) = failure {
            // Ignored when the receiver is already gone
            let _ = tx.send(Err(e)).await;
        }
        self.transition(StreamState::Closed);

        match &outcome {
            StreamOutcome::Completed => info!(
                frames_decoded = counters.frames_decoded,
                frames_processed = counters.frames_processed,
                records = counters.records_emitted,
                detections = counters.detections_emitted,
                "Detection stream completed"
            ),
            StreamOutcome::Cancelled => info!(
                frames_processed = counters.frames_processed,
                records = counters.records_emitted,
                "Detection stream cancelled"
            ),
            StreamOutcome::Failed { reason } => error!(
                frames_processed = counters.frames_processed,
                records = counters.records_emitted,
                error = %reason,
                "Detection stream failed"
            ),
        }
        metrics::record_stream_outcome(outcome.as_str());

        StreamSummary {
            outcome,
            frames_decoded: counters.frames_decoded,
            frames_processed: counters.frames_processed,
            records_emitted: counters.records_emitted,
            detections_emitted: counters.detections_emitted,
        }
    }

    async fn pump(
        &mut self,
        tx: &RecordSender,
        frame_rate: f64,
        counters: &mut Counters,
    ) -> MediaResult<LoopEnd> {
        loop {
            if self.is_cancelled(tx) {
                return Ok(LoopEnd::Cancelled);
            }

            let Some(frame) = self.source.next_frame().await? else {
                return Ok(LoopEnd::Exhausted);
            };
            counters.frames_decoded += 1;
            metrics::record_frame_decoded();

            if !self.thresholds.samples(frame.index) {
                continue;
            }
            if self.is_cancelled(tx) {
                return Ok(LoopEnd::Cancelled);
            }

            let started = Instant::now();
            let raw = self.detector.detect(&frame, &self.thresholds).await?;
            metrics::record_frame_processed(self.detector.name(), started.elapsed().as_secs_f64());
            counters.frames_processed += 1;

            let detections = filter_detections(
                &raw,
                frame.width(),
                frame.height(),
                self.thresholds.max_area_ratio,
                self.detector.class_names(),
            );
            let kept = detections.len();
            metrics::record_filtered(kept, raw.len() - kept);

            let line = FrameRecord::new(frame.index, frame_rate, detections).to_ndjson_line()?;
            if tx.send(Ok(line)).await.is_err() {
                debug!(frame_number = frame.index, "Receiver dropped");
                return Ok(LoopEnd::Cancelled);
            }
            counters.records_emitted += 1;
            counters.detections_emitted += kept as u64;

            // Let the transport flush and observe disconnects between frames
            tokio::task::yield_now().await;
        }
    }

    fn is_cancelled(&self, tx: &RecordSender) -> bool {
        tx.is_closed() || self.cancel.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn release(&mut self) {
        self.source.close().await;
        if let Some(mut stager) = self.stager.take() {
            metrics::record_cleanup_failures(stager.release_all());
        }
    }

    fn transition(&mut self, next: StreamState) {
        debug!(from = ?self.state, to = ?next, "Stream state transition");
        self.state = next;
    }
}

impl fmt::Debug for FrameStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameStreamer")
            .field("detector", &self.detector.name())
            .field("thresholds", &self.thresholds)
            .field("stager", &self.stager)
            .field("state", &self.state)
            .finish()
    }
}
