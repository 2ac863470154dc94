//! Transcription API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Starting transcription of a finalized recording (POST /meetings/:id/transcription/start)
//! - Editing the transcript text (PUT /meetings/:id/transcription)
//! - Getting a transcript download URL (GET /meetings/:id/transcription/download-url)

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::transcription::TranscriptionPipeline;

#[derive(Debug, Default, serde::Deserialize)]
struct StartRequest {
    language: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct UpdateRequest {
    user_id: String,
    text: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings/:id/transcription/start", post(start_transcription))
        .route("/meetings/:id/transcription", put(update_transcript))
        .route(
            "/meetings/:id/transcription/download-url",
            get(download_url),
        )
        .with_state(state)
}

fn pipeline(state: &AppState) -> ApiResult<&TranscriptionPipeline> {
    state
        .pipeline
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("no transcription provider is configured"))
}

async fn start_transcription(
    Path(id): Path<String>,
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> ApiResult<Json<Value>> {
    let pipeline = state
        .pipeline
        .clone()
        .ok_or_else(|| ApiError::bad_request("no transcription provider is configured"))?;
    let language = body.and_then(|Json(r)| r.language);
    info!("Transcription start request for meeting {}", id);

    let mut conn = crate::db::init_db()?;
    let meeting = pipeline.start(&mut conn, &id, language).await?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "transcription": meeting.transcription,
    })))
}

async fn update_transcript(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<UpdateRequest>,
) -> ApiResult<Json<Value>> {
    let mut conn = crate::db::init_db()?;
    let meeting = pipeline(&state)?
        .update(&mut conn, &id, &request.user_id, &request.text)
        .await?;

    Ok(Json(json!({
        "meeting_id": meeting.id,
        "transcription": meeting.transcription,
    })))
}

async fn download_url(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let format = params.get("format").map(String::as_str).unwrap_or("txt");

    let mut conn = crate::db::init_db()?;
    let url = pipeline(&state)?.download_url(&mut conn, &id, format).await?;

    Ok(Json(json!({
        "meeting_id": id,
        "format": format,
        "url": url,
    })))
}
