//! API error types.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use vdet_media::MediaError;

use crate::config::is_production_environment;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Map an upload read failure by the status the multipart layer reports.
    pub fn upload(status: StatusCode, msg: impl Into<String>) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(msg.into())
        } else if status.is_client_error() {
            Self::BadRequest(msg.into())
        } else {
            Self::Internal(msg.into())
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Media(e) => media_status(e),
        }
    }

    /// Message sent to the client. Internal details are withheld in
    /// production.
    pub fn public_detail(&self, production: bool) -> String {
        if production && self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::Internal(_) => "internal",
            ApiError::Media(e) if e.is_storage_exhausted() => "storage_exhausted",
            ApiError::Media(e) => e.code(),
        }
    }
}

fn media_status(e: &MediaError) -> StatusCode {
    match e {
        MediaError::Staging { .. } if e.is_storage_exhausted() => StatusCode::INSUFFICIENT_STORAGE,
        MediaError::MediaOpen(_) | MediaError::ModelLoad(_) => StatusCode::UNPROCESSABLE_ENTITY,
        MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => StatusCode::SERVICE_UNAVAILABLE,
        MediaError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::upload(e.status(), e.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(status = %status, error = %self, "Request failed");
        } else {
            warn!(status = %status, error = %self, "Request rejected");
        }

        let production = std::env::var("ENVIRONMENT")
            .map(|env| is_production_environment(&env))
            .unwrap_or(false);
        let detail = self.public_detail(production);

        let body = ErrorResponse {
            detail,
            code: Some(self.code().to_string()),
        };

        (status, Json(body)).into_response()
    }
}
