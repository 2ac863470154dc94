//! Meeting lifecycle API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Creating a meeting (POST /meetings)
//! - Listing meetings (GET /meetings)
//! - Getting a meeting by ID or join token (GET /meetings/:id, /meetings/by-token/:token)
//! - Joining and leaving (POST /meetings/:id/join, /meetings/:id/leave)
//! - Ending and deleting (POST /meetings/:id/end, DELETE /meetings/:id)

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::meeting::lifecycle::CreateMeetingRequest;

#[derive(Debug, serde::Deserialize)]
struct CreateRequest {
    #[serde(flatten)]
    meeting: CreateMeetingRequest,
    owner_id: String,
}

#[derive(Debug, serde::Deserialize)]
struct JoinRequest {
    token: String,
    name: String,
    email: String,
}

#[derive(Debug, serde::Deserialize)]
struct LeaveRequest {
    email: String,
}

#[derive(Debug, serde::Deserialize)]
struct EndRequest {
    user_id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings", post(create_meeting).get(list_meetings))
        .route("/meetings/:id", get(get_meeting).delete(delete_meeting))
        .route("/meetings/by-token/:token", get(get_meeting_by_token))
        .route("/meetings/:id/join", post(join_meeting))
        .route("/meetings/:id/leave", post(leave_meeting))
        .route("/meetings/:id/end", post(end_meeting))
        .with_state(state)
}

async fn create_meeting(
    State(state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> ApiResult<Json<Value>> {
    info!("Meeting create request from {}", request.owner_id);

    let meeting = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state
            .lifecycle
            .create(&conn, request.meeting, &request.owner_id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meeting": meeting })))
}

async fn list_meetings(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    let meetings = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.list(&conn, limit)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meetings": meetings })))
}

async fn get_meeting(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.get(&conn, &id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meeting": meeting })))
}

async fn get_meeting_by_token(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.get_by_token(&conn, &token)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meeting": meeting })))
}

async fn join_meeting(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> ApiResult<Json<Value>> {
    let result = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state
            .lifecycle
            .join(&conn, &id, &request.token, &request.name, &request.email)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({
        "meeting": result.meeting,
        "participant": result.participant,
        "credential": result.credential,
    })))
}

async fn leave_meeting(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<LeaveRequest>,
) -> ApiResult<Json<Value>> {
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.leave(&conn, &id, &request.email)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meeting": meeting })))
}

async fn end_meeting(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<EndRequest>,
) -> ApiResult<Json<Value>> {
    let meeting = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.end(&conn, &id, &request.user_id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "meeting": meeting })))
}

async fn delete_meeting(
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> ApiResult<Json<Value>> {
    let user_id = params
        .get("user_id")
        .cloned()
        .ok_or_else(|| ApiError::bad_request("user_id query parameter is required"))?;

    tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        state.lifecycle.delete(&conn, &id, &user_id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "success": true })))
}
