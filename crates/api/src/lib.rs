//! Drowsiness Analysis API Server
//!
//! HTTP surface over the job orchestrator: video upload, analysis start,
//! status polling, cancellation, health and Prometheus metrics.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use dms::{FrameAnalyzer, OnnxLandmarkDetector};
use jobs::JobOrchestrator;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use storage::JsonFileRepository;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;
use video_analysis::AnalysisPipeline;
use video_sampler::{FfmpegSource, VideoSource};

pub mod config;
pub mod error;
mod routes;

pub use config::{LoggingConfig, ServerConfig, ServiceConfig, StorageConfig};
pub use error::ApiError;

/// Application state shared across handlers
pub struct AppState<V: VideoSource> {
    pub orchestrator: Arc<JobOrchestrator<V>>,
    /// Prometheus renderer, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Largest accepted upload body
    pub max_upload_bytes: u64,
    pub version: String,
    pub start_time: std::time::Instant,
}

impl<V: VideoSource> AppState<V> {
    pub fn new(orchestrator: Arc<JobOrchestrator<V>>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            orchestrator,
            metrics,
            max_upload_bytes: config::ServerConfig::default().max_upload_bytes as u64,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_upload_limit(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_jobs: usize,
}

/// Create the application router
pub fn create_router<V: VideoSource>(state: Arc<AppState<V>>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler::<V>))
        .route("/metrics", get(metrics_handler::<V>))
        .route("/api/v1/videos", post(routes::videos::upload::<V>))
        .route(
            "/api/v1/analyses",
            post(routes::analyses::start::<V>).get(routes::analyses::list::<V>),
        )
        .route("/api/v1/analyses/:video_id", get(routes::analyses::get::<V>))
        .route("/api/v1/analyses/:video_id/cancel", post(routes::analyses::cancel::<V>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler<V: VideoSource>(State(state): State<Arc<AppState<V>>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        active_jobs: state.orchestrator.active_count(),
    })
}

/// Prometheus text exposition
async fn metrics_handler<V: VideoSource>(State(state): State<Arc<AppState<V>>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_new(&config.level)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

/// Wire the production pipeline and serve until Ctrl-C
pub async fn run_server(config: ServiceConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    // Model problems stop the service here rather than failing every job
    let detector = OnnxLandmarkDetector::shared(&config.dms).await?;
    let analyzer = FrameAnalyzer::new(config.dms.clone(), detector);

    let pipeline = AnalysisPipeline::new(FfmpegSource::new(config.sampler.clone()), Arc::new(analyzer))
        .with_target_fps(config.sampler.target_fps);
    let repository = JsonFileRepository::open(&config.storage.analyses_dir)?;
    let orchestrator = JobOrchestrator::new(
        Arc::new(repository),
        Arc::new(pipeline),
        config.storage.uploads_dir.clone(),
    );

    let state = AppState::new(Arc::new(orchestrator), metrics)
        .with_upload_limit(config.server.max_upload_bytes as u64);
    let app = create_router(Arc::new(state));

    let addr = config.server.bind_addr();
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
