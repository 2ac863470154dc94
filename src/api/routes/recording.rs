//! Recording control API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting a recording session (POST /meetings/:id/recording/start)
//! - Stopping a recording session (POST /meetings/:id/recording/stop)
//! - Finalizing with the captured artifact (POST /meetings/:id/recording/finalize)

use axum::{
    extract::{Path, State},
    response::Json,
    routing::post,
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::recording::StartRecordingRequest;

/// Finalize request: the captured artifact as base64 plus its container
/// format.
#[derive(Debug, serde::Deserialize)]
struct FinalizeRequest {
    artifact_base64: String,
    format: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings/:id/recording/start", post(start_recording))
        .route("/meetings/:id/recording/stop", post(stop_recording))
        .route("/meetings/:id/recording/finalize", post(finalize_recording))
        .with_state(state)
}

async fn start_recording(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<StartRecordingRequest>>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    info!("Recording start request for meeting {}", id);

    let mut conn = crate::db::init_db()?;
    let meeting = state.orchestrator.start(&mut conn, &id, request).await?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "recording": meeting.recording,
    })))
}

async fn stop_recording(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    info!("Recording stop request for meeting {}", id);

    let mut conn = crate::db::init_db()?;
    let meeting = state.orchestrator.stop(&mut conn, &id).await?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "recording": meeting.recording,
    })))
}

async fn finalize_recording(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    let artifact = BASE64
        .decode(&request.artifact_base64)
        .map_err(|e| ApiError::bad_request(format!("invalid base64 artifact: {}", e)))?;

    info!(
        "Recording finalize request for meeting {} ({} bytes, {})",
        id,
        artifact.len(),
        request.format
    );

    let mut conn = crate::db::init_db()?;
    let meeting = state
        .orchestrator
        .finalize(&mut conn, &id, &artifact, &request.format)
        .await?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "recording": meeting.recording,
    })))
}
