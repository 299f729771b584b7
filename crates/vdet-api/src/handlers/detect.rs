//! Detection endpoints.
//!
//! Both endpoints take a multipart body with a `model` part plus a media
//! part (`video` or `image`). Uploads are staged to disk before any
//! detection work starts; staging, model load and media open failures are
//! answered with an error status. Once a stream has started, its status is
//! fixed at 200 and a failure can only end the body early.

use std::path::PathBuf;

use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{stream, TryStreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, Instrument, Span};

use vdet_media::{
    detect_image, media_extension, ArtifactStager, FrameStreamer, MODEL_EXTENSION,
};
use vdet_models::{ArtifactKind, ImageDetections, MediaKind};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart part carrying the model artifact.
pub const MODEL_PART: &str = "model";
/// Multipart part carrying the video for streaming detection.
pub const VIDEO_PART: &str = "video";
/// Multipart part carrying the still image.
pub const IMAGE_PART: &str = "image";

/// Content type of the streaming response.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Files staged for one request.
struct StagedUpload {
    stager: ArtifactStager,
    model: PathBuf,
    media: PathBuf,
}

/// Stream per-frame detections for an uploaded video as NDJSON.
pub async fn stream_detections(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    start_stream(&state, multipart).await.map_err(rejected)
}

/// Detect objects in an uploaded image and return them in one response.
pub async fn image_detections(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ImageDetections>> {
    run_image(&state, multipart).await.map_err(rejected)
}

async fn start_stream(state: &AppState, multipart: Multipart) -> ApiResult<Response> {
    let upload = stage_upload(state, multipart, VIDEO_PART, MediaKind::Video).await?;
    let detector = state.loader.load(&upload.model).await?;
    let source = state.opener.open(&upload.media, MediaKind::Video).await?;

    info!(
        detector = detector.name(),
        frame_rate = source.frame_rate(),
        frame_stride = state.config.thresholds.frame_stride,
        "Starting detection stream"
    );

    let (tx, rx) = mpsc::channel(state.config.stream_buffer);
    let streamer = FrameStreamer::new(source, detector, state.config.thresholds)
        .with_stager(upload.stager)
        .with_cancel(state.shutdown.clone());

    tokio::spawn(
        async move {
            metrics::record_stream_started();
            let _active = scopeguard::guard((), |_| metrics::record_stream_finished());
            streamer.run(tx).await;
        }
        .instrument(Span::current()),
    );

    // The body ends when the emitter drops its sender, after cleanup
    let records = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(records),
    )
        .into_response())
}

async fn run_image(state: &AppState, multipart: Multipart) -> ApiResult<Json<ImageDetections>> {
    let mut upload = stage_upload(state, multipart, IMAGE_PART, MediaKind::Image).await?;
    let detector = state.loader.load(&upload.model).await?;
    let mut source = state.opener.open(&upload.media, MediaKind::Image).await?;

    let result = detect_image(source.as_mut(), detector.as_ref(), &state.config.thresholds).await;
    vdet_media::metrics::record_cleanup_failures(upload.stager.release_all());

    Ok(Json(ImageDetections {
        detections: result?,
    }))
}

/// Copy the model and media parts to disk.
///
/// Unknown parts and repeated parts are skipped. Files staged before a
/// failure are removed when the stager is dropped.
async fn stage_upload(
    state: &AppState,
    mut multipart: Multipart,
    media_part: &str,
    media_kind: MediaKind,
) -> ApiResult<StagedUpload> {
    let mut stager = ArtifactStager::new(state.store.clone());
    let mut model = None;
    let mut media = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        let (kind, extension) = if name == MODEL_PART && model.is_none() {
            (ArtifactKind::Model, MODEL_EXTENSION.to_string())
        } else if name == media_part && media.is_none() {
            (ArtifactKind::Media, media_extension(field.file_name(), media_kind))
        } else {
            debug!(part = %name, "Ignoring multipart field");
            continue;
        };

        let mut upload_status = None;
        let chunks = Box::pin(field.inspect_err(|e| upload_status = Some(e.status())));
        let staged = stager.stage(kind, &extension, chunks).await;
        let path = match staged {
            Ok(path) => path,
            Err(e) => {
                return Err(match upload_status {
                    Some(status) => ApiError::upload(status, e.to_string()),
                    None => e.into(),
                })
            }
        };

        if let Some(file) = stager.files().last() {
            metrics::record_upload_bytes(kind.as_str(), file.bytes);
        }
        match kind {
            ArtifactKind::Model => model = Some(path),
            ArtifactKind::Media => media = Some(path),
        }
    }

    let model =
        model.ok_or_else(|| ApiError::bad_request(format!("Missing '{}' part", MODEL_PART)))?;
    let media =
        media.ok_or_else(|| ApiError::bad_request(format!("Missing '{}' part", media_part)))?;

    Ok(StagedUpload {
        stager,
        model,
        media,
    })
}

fn rejected(e: ApiError) -> ApiError {
    metrics::record_rejected(e.code());
    e
}
