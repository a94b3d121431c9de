//! Clip API handlers
//!
//! `GET /clip` renders one clip, `POST /clips/batch` renders a page of clips
//! in one ordered response, `DELETE /cache` empties the render cache.
//!
//! A clip that fails to render is reported in its own result entry; only a
//! malformed batch body fails the whole request.

use axum::{
    extract::{Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::clips::{merge_settings, ClipRequest, ClipResult, RenderError, RenderSettings};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Query parameters of `GET /clip` that are not rendering settings
const CLIP_QUERY_KEYS: [&str; 5] = ["file_path", "file", "start_time", "end_time", "clip_id"];

/// One entry of a batch request
#[derive(Debug, Deserialize)]
pub struct BatchClip {
    /// String or number; defaults to the entry's index
    #[serde(default)]
    pub clip_id: Option<Value>,
    #[serde(alias = "file")]
    pub file_path: PathBuf,
    pub start_time: f64,
    pub end_time: f64,
    /// Overrides for this clip, merged over the batch settings
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
}

/// POST /clips/batch request
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub clips: Vec<BatchClip>,
    /// Settings shared by every clip in the batch
    #[serde(default)]
    pub settings: Option<Map<String, Value>>,
}

/// DELETE /cache response
#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
}

/// GET /clip?file_path=..&start_time=..&end_time=..&<settings>
///
/// Setting values are parsed as JSON when possible, so
/// `dB_range=[-90,-10]` and `use_bandpass=true` arrive typed.
pub async fn get_clip(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ClipResult>> {
    let file_path = params
        .get("file_path")
        .or_else(|| params.get("file"))
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("file_path is required".to_string()))?;
    let start_time = parse_time(&params, "start_time")?;
    let end_time = parse_time(&params, "end_time")?;
    let clip_id = params.get("clip_id").cloned().unwrap_or_else(|| "0".to_string());

    let overrides: Map<String, Value> = params
        .iter()
        .filter(|(key, _)| !CLIP_QUERY_KEYS.contains(&key.as_str()))
        .map(|(key, raw)| {
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            (key.clone(), value)
        })
        .collect();
    let settings = RenderSettings::from_json(Value::Object(overrides))
        .map_err(|e| ApiError::BadRequest(format!("Invalid clip settings: {}", e)))?;

    let request = ClipRequest::new(clip_id.clone(), file_path, start_time, end_time).with_settings(settings);
    let (payload, cached) = state.clips.render_async(request).await?;
    debug!(clip_id = %clip_id, cached, "Single clip rendered");

    Ok(Json(ClipResult::success(clip_id, (*payload).clone(), cached)))
}

/// POST /clips/batch
///
/// Returns one result per requested clip, in request order.
pub async fn render_batch(
    State(state): State<AppState>,
    Json(batch): Json<BatchRequest>,
) -> ApiResult<Json<Vec<ClipResult>>> {
    if batch.clips.is_empty() {
        return Err(ApiError::BadRequest("Batch contains no clips".to_string()));
    }

    let total = batch.clips.len();
    let mut results: Vec<Option<ClipResult>> = vec![None; total];
    let mut indices = Vec::with_capacity(total);
    let mut requests = Vec::with_capacity(total);

    for (index, clip) in batch.clips.into_iter().enumerate() {
        let clip_id = match clip.clip_id {
            Some(Value::String(id)) => id,
            Some(Value::Null) | None => index.to_string(),
            Some(other) => other.to_string(),
        };
        let merged = merge_settings(batch.settings.as_ref(), clip.settings.as_ref());
        match RenderSettings::from_json(merged) {
            Ok(settings) => {
                indices.push(index);
                requests.push(
                    ClipRequest::new(clip_id, clip.file_path, clip.start_time, clip.end_time)
                        .with_settings(settings),
                );
            }
            Err(e) => {
                let error = RenderError::InvalidRequest(format!("Invalid clip settings: {}", e));
                results[index] = Some(ClipResult::error(clip_id, &error));
            }
        }
    }

    let rendered = state.clips.render_batch_async(requests).await;
    for (index, result) in indices.into_iter().zip(rendered) {
        results[index] = Some(result);
    }

    // Every index was filled above
    Ok(Json(results.into_iter().flatten().collect()))
}

/// DELETE /cache
pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    Json(ClearCacheResponse {
        cleared: state.clips.clear_cache(),
    })
}

fn parse_time(params: &HashMap<String, String>, key: &str) -> ApiResult<f64> {
    let raw = params
        .get(key)
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", key)))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a number, got {:?}", key, raw)))
}

/// Build clip routes
pub fn clip_routes() -> Router<AppState> {
    Router::new()
        .route("/clip", get(get_clip))
        .route("/clips/batch", post(render_batch))
        .route("/cache", delete(clear_cache))
}
