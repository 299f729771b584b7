//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;

use vdet_models::{ThresholdConfig, ThresholdError};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins; `*` allows every origin
    pub cors_origins: Vec<String>,
    /// Optional request body cap in bytes
    pub max_body_size: Option<usize>,
    /// Directory for staged uploads
    pub work_dir: PathBuf,
    /// Records buffered between the emitter and the response body
    pub stream_buffer: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
    /// Detection thresholds copied into every request
    pub thresholds: ThresholdConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: None,
            work_dir: std::env::temp_dir(),
            stream_buffer: 1,
            environment: "development".to_string(),
            metrics_enabled: true,
            thresholds: ThresholdConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = ThresholdConfig::default();

        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("API_PORT", 8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok()),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
            stream_buffer: env_or("STREAM_BUFFER", 1usize).max(1),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            thresholds: ThresholdConfig {
                confidence_threshold: env_or("DETECT_CONF_THRESHOLD", defaults.confidence_threshold),
                iou_threshold: env_or("DETECT_IOU_THRESHOLD", defaults.iou_threshold),
                input_size: env_or("DETECT_INPUT_SIZE", defaults.input_size),
                frame_stride: env_or("DETECT_FRAME_STRIDE", defaults.frame_stride),
                max_area_ratio: env_or("DETECT_MAX_AREA_RATIO", defaults.max_area_ratio),
            },
        }
    }

    /// Reject threshold values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        self.thresholds.validate()
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        is_production_environment(&self.environment)
    }
}

/// `ENVIRONMENT` names production, ignoring case and surrounding spaces.
pub fn is_production_environment(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.cors_origins, vec!["*"]);
        assert!(config.max_body_size.is_none());
        assert_eq!(config.stream_buffer, 1);
        assert_eq!(config.thresholds.confidence_threshold, 0.5);
        assert_eq!(config.thresholds.iou_threshold, 0.6);
        assert_eq!(config.thresholds.input_size, 640);
        assert_eq!(config.thresholds.frame_stride, 2);
        assert_eq!(config.thresholds.max_area_ratio, 0.6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("VDET_TEST_ENV_OR", " 12 ");
        assert_eq!(env_or("VDET_TEST_ENV_OR", 3u32), 12);
        std::env::set_var("VDET_TEST_ENV_OR", "twelve");
        assert_eq!(env_or("VDET_TEST_ENV_OR", 3u32), 3);
        std::env::remove_var("VDET_TEST_ENV_OR");
        assert_eq!(env_or("VDET_TEST_ENV_OR", 0.5f32), 0.5);
    }

    #[test]
    fn test_invalid_stride_fails_validation() {
        let config = ApiConfig {
            thresholds: ThresholdConfig::default().with_frame_stride(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_is_production() {
        let config = ApiConfig {
            environment: "Production".to_string(),
            ..Default::default()
        };
        assert!(config.is_production());
        assert!(!ApiConfig::default().is_production());
    }
}
