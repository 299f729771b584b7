//! Axum API server binary.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vdet_api::{create_router, metrics, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("vdet=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting vdet-api");

    // Load configuration
    let config = ApiConfig::from_env();
    config.validate().context("Invalid detection thresholds")?;
    info!(
        host = %config.host,
        port = config.port,
        work_dir = %config.work_dir.display(),
        thresholds = ?config.thresholds,
        "API config loaded"
    );

    if config.cors_origins.iter().any(|o| o == "*") {
        warn!("CORS allows every origin; set CORS_ORIGINS for public deployments");
    }

    if let Err(e) = vdet_media::check_ffmpeg().and_then(|_| vdet_media::check_ffprobe()) {
        warn!(error = %e, "Video decoding unavailable until FFmpeg is installed");
    }

    // Create application state
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(config.clone(), shutdown_rx)
        .context("Failed to create application state")?;

    // Initialize metrics
    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    // Create router
    let app = create_router(state, metrics_handle);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl-C, then tell active streams to stop between frames.
async fn shutdown_signal(shutdown: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
    let _ = shutdown.send(true);
}
