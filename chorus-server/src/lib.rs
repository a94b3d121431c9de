//! chorus-server library interface
//!
//! Job orchestration (`jobs`), clip rendering (`clips`) and the axum HTTP
//! layer over both (`api`). The binary in `main.rs` only wires these up.

pub mod api;
pub mod clips;
pub mod error;
pub mod jobs;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chorus_common::config::JobsConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clips::ClipService;
use crate::jobs::JobRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub clips: Arc<ClipService>,
    /// Worker executables per job kind
    pub jobs_config: Arc<JobsConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>, clips: Arc<ClipService>, jobs_config: JobsConfig) -> Self {
        Self {
            registry,
            clips,
            jobs_config: Arc::new(jobs_config),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::job_routes())
        .merge(api::clip_routes())
        .merge(api::health_routes())
        .with_state(state)
}
