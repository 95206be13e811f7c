//! Progress sync routes.
//!
//! Every write and read passes through the canonicalization engine first;
//! the resolved canonical id is the key the progress table is addressed by.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    error::{AppError, AppResult},
    extract::AuthUser,
};
use crate::{state::AppState, store::ProgressRecord};

#[derive(Debug, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default)]
    document: String,
    #[serde(default)]
    progress: String,
    percentage: Option<f64>,
    #[serde(default)]
    device: String,
    #[serde(default)]
    device_id: String,
    filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    document: String,
    progress: String,
    percentage: f64,
    device: String,
    device_id: String,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    filename: Option<String>,
}

impl From<ProgressRecord> for ProgressResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            document: record.document,
            progress: record.progress,
            percentage: record.percentage,
            device: record.device,
            device_id: record.device_id,
            timestamp: record.timestamp,
            filename: record.filename,
        }
    }
}

/// `PUT /syncs/progress`
pub async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<ProgressUpdate>,
) -> AppResult<impl IntoResponse> {
    let Some(percentage) = body.percentage else {
        return Err(AppError::bad_request("Missing required fields"));
    };
    if body.document.is_empty()
        || body.progress.is_empty()
        || body.device.is_empty()
        || body.device_id.is_empty()
    {
        return Err(AppError::bad_request("Missing required fields"));
    }
    if !(0.0..=1.0).contains(&percentage) {
        return Err(AppError::bad_request("Percentage must be between 0 and 1"));
    }

    let canonical = state
        .resolver
        .resolve(&user.id, &body.document, body.filename.as_deref())?;
    debug!(document = %body.document, %canonical, "progress write");

    let record = ProgressRecord {
        user_id: user.id,
        document: canonical,
        progress: body.progress,
        percentage,
        device: body.device,
        device_id: body.device_id,
        timestamp: unix_now(),
        filename: body.filename,
    };
    state.store.upsert_progress(&record)?;
    Ok(Json(json!({ "status": "success" })))
}

/// `GET /syncs/progress/{document}`
pub async fn get(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(document): Path<String>,
) -> AppResult<Json<ProgressResponse>> {
    let canonical = state.resolver.resolve(&user.id, &document, None)?;
    let Some(record) = state.store.get_progress(&user.id, &canonical)? else {
        return Err(AppError::not_found("Progress not found"));
    };
    Ok(Json(record.into()))
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
