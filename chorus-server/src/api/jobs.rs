//! Job API handlers
//!
//! Each job kind (`inference`, `training`, `extraction`) has the same three
//! routes: `POST /{kind}/run`, `GET /{kind}/status/{job_id}` and
//! `POST /{kind}/cancel/{job_id}`. An unknown kind is a 400.
//! `GET /jobs` and `DELETE /jobs/{job_id}` work across kinds.
//!
//! `POST /{kind}/run?name=...` labels the job; without it a name of the form
//! `<kind>_task_<YYYYmmdd_HHMMSS>` is generated.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use chorus_common::{JobKind, JobState, JobStatus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::jobs::{CancelOutcome, JobInfo};
use crate::AppState;

/// POST /{kind}/run query parameters
#[derive(Debug, Default, Deserialize)]
pub struct RunJobParams {
    pub name: Option<String>,
}

/// POST /{kind}/run response
#[derive(Debug, Serialize)]
pub struct RunJobResponse {
    pub job_id: String,
    pub job_folder: PathBuf,
}

/// GET /{kind}/status response
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub status: JobState,
    pub stage: String,
    pub progress: Option<f32>,
    pub message: String,
    pub metadata: Map<String, Value>,
}

impl From<JobStatus> for JobStatusResponse {
    fn from(status: JobStatus) -> Self {
        Self {
            status: status.status,
            stage: status.stage,
            progress: status.progress,
            message: status.message,
            metadata: status.metadata,
        }
    }
}

/// POST /{kind}/cancel response
#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub job_id: String,
    pub outcome: CancelOutcome,
    pub status: JobState,
    pub message: String,
}

/// DELETE /jobs/{job_id} response
#[derive(Debug, Serialize)]
pub struct ClearJobResponse {
    pub job_id: String,
    pub cleared: bool,
}

/// POST /{kind}/run
///
/// Create the job folder from the posted configuration and launch the worker.
pub async fn run_job(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<RunJobParams>,
    Json(config): Json<Value>,
) -> ApiResult<Json<RunJobResponse>> {
    let kind: JobKind = kind.parse()?;
    if !config.is_object() {
        return Err(ApiError::BadRequest(
            "Job configuration must be a JSON object".to_string(),
        ));
    }

    let job_id = state
        .registry
        .create_named_job(kind, params.name.as_deref(), &config)?;
    let worker = state.jobs_config.worker_for(kind);
    state.registry.start(&job_id, &worker)?;

    info!(job_id = %job_id, kind = %kind, "Job launched via API");

    Ok(Json(RunJobResponse {
        job_folder: state.registry.paths(&job_id).dir,
        job_id,
    }))
}

/// GET /{kind}/status/{job_id}
pub async fn job_status(
    State(state): State<AppState>,
    Path((kind, job_id)): Path<(String, String)>,
) -> ApiResult<Json<JobStatusResponse>> {
    ensure_kind(&state, &job_id, kind.parse()?)?;
    let status = state.registry.get_status(&job_id)?;
    Ok(Json(status.into()))
}

/// POST /{kind}/cancel/{job_id}
///
/// Idempotent: cancelling a finished or already-cancelled job succeeds.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path((kind, job_id)): Path<(String, String)>,
) -> ApiResult<Json<CancelJobResponse>> {
    ensure_kind(&state, &job_id, kind.parse()?)?;
    let outcome = state.registry.cancel(&job_id)?;
    let status = state.registry.get_status(&job_id)?;

    Ok(Json(CancelJobResponse {
        job_id,
        outcome,
        status: status.status,
        message: status.message,
    }))
}

/// GET /jobs
///
/// Every job under the root folder, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<Vec<JobInfo>>> {
    let ids = state.registry.list_jobs()?;
    let mut jobs = Vec::with_capacity(ids.len());
    for job_id in ids {
        match state.registry.job_info(&job_id) {
            Ok(info) => jobs.push(info),
            Err(e) => warn!(job_id = %job_id, error = %e, "Skipping job in listing"),
        }
    }
    Ok(Json(jobs))
}

/// DELETE /jobs/{job_id}
///
/// Forget a finished job; its folder stays on disk.
pub async fn clear_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ClearJobResponse>> {
    state.registry.clear(&job_id)?;
    Ok(Json(ClearJobResponse {
        job_id,
        cleared: true,
    }))
}

/// A job is only visible under the prefix of its own kind
fn ensure_kind(state: &AppState, job_id: &str, kind: JobKind) -> ApiResult<()> {
    let actual = state.registry.job_kind(job_id)?;
    if actual != kind {
        return Err(ApiError::NotFound(format!(
            "No {} job {} (it is a {} job)",
            kind, job_id, actual
        )));
    }
    Ok(())
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", delete(clear_job))
        .route("/:kind/run", post(run_job))
        .route("/:kind/status/:job_id", get(job_status))
        .route("/:kind/cancel/:job_id", post(cancel_job))
}
