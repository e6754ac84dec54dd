//! Health Check and Metrics Endpoints
//!
//! - `GET /health` - JSON status with version, backend and uptime
//! - `GET /healthz` - liveness probe (plain OK)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: &'static str,
    /// Service version.
    pub version: String,
    /// Configured backend source tag.
    pub backend: &'static str,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
}

/// Shared state for the health routes.
#[derive(Debug)]
pub struct HealthState {
    version: String,
    backend: &'static str,
    started_at: Instant,
}

impl HealthState {
    /// Create health state, starting the uptime clock now.
    #[must_use]
    pub fn new(version: impl Into<String>, backend: &'static str) -> Self {
        Self {
            version: version.into(),
            backend,
            started_at: Instant::now(),
        }
    }
}

/// Routes for health and metrics.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: state.version.clone(),
        backend: state.backend,
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
    })
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}
