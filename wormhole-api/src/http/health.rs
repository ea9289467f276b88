//! Health check and metrics endpoints
//!
//! Provides simple health check for monitoring probes.

use axum::{http::header, response::IntoResponse, routing::get, Router};

use crate::http::{AppResult, AppState};

/// Health and metrics router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

/// Basic health check (always returns OK if server is running)
pub async fn health_check() -> impl IntoResponse {
    "OK"
}

/// Prometheus text exposition
pub async fn metrics() -> AppResult<impl IntoResponse> {
    let body = wormhole_core::metrics::gather_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
