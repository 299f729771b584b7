//! Axum HTTP API server for streaming object detection.
//!
//! This crate provides:
//! - Multipart intake of a model and a video or image
//! - NDJSON streaming of per-frame detections
//! - Health/readiness probes and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
