//! Health check and service statistics

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::clips::CacheStats;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("chorus-server")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Clips currently held in the render cache
    pub cache_size: usize,
}

/// GET /stats response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStats,
    pub worker_threads: usize,
    /// Jobs known to the registry (in memory)
    pub jobs_registered: usize,
    pub uptime_seconds: u64,
}

fn uptime_seconds(state: &AppState) -> u64 {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    uptime.num_seconds().max(0) as u64
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "chorus-server".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(&state),
        cache_size: state.clips.cache_len(),
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        cache: state.clips.cache_stats(),
        worker_threads: state.clips.worker_threads(),
        jobs_registered: state.registry.len(),
        uptime_seconds: uptime_seconds(&state),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}
