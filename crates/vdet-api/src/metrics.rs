//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "vdet_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "vdet_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "vdet_http_requests_in_flight";

    // Detection request metrics
    pub const STREAMS_ACTIVE: &str = "vdet_streams_active";
    pub const UPLOAD_BYTES_TOTAL: &str = "vdet_upload_bytes_total";
    pub const REQUESTS_REJECTED_TOTAL: &str = "vdet_requests_rejected_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Track a detection stream that started emitting.
pub fn record_stream_started() {
    gauge!(names::STREAMS_ACTIVE).increment(1.0);
}

/// Track a detection stream that finished for any reason.
pub fn record_stream_finished() {
    gauge!(names::STREAMS_ACTIVE).decrement(1.0);
}

/// Record bytes staged for one upload part.
pub fn record_upload_bytes(kind: &str, bytes: u64) {
    let labels = [("kind", kind.to_string())];
    counter!(names::UPLOAD_BYTES_TOTAL, &labels).increment(bytes);
}

/// Record a request rejected before streaming started.
pub fn record_rejected(code: &str) {
    let labels = [("code", code.to_string())];
    counter!(names::REQUESTS_REJECTED_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
///
/// Labels use the matched route template so unknown paths collapse into
/// a single series.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
