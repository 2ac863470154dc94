//! Attendance API endpoints.
//!
//! Provides HTTP endpoints for:
//! - Punching in (POST /attendance/punch-in)
//! - Punching out (POST /attendance/punch-out)

use axum::{response::Json, routing::post, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::attendance::AttendanceService;
use crate::db::attendance::AttendanceRecord;

#[derive(Debug, serde::Deserialize)]
struct PunchInRequest {
    candidate_id: String,
    timezone: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct PunchOutRequest {
    candidate_id: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/attendance/punch-in", post(punch_in))
        .route("/attendance/punch-out", post(punch_out))
}

async fn punch_in(Json(request): Json<PunchInRequest>) -> ApiResult<Json<Value>> {
    info!("Punch-in request for candidate {}", request.candidate_id);

    let record = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        AttendanceService::punch_in(&conn, &request.candidate_id, request.timezone.as_deref())
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "record": record_json(&record) })))
}

async fn punch_out(Json(request): Json<PunchOutRequest>) -> ApiResult<Json<Value>> {
    info!("Punch-out request for candidate {}", request.candidate_id);

    let record = tokio::task::spawn_blocking(move || {
        let conn = crate::db::init_db()?;
        AttendanceService::punch_out(&conn, &request.candidate_id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(json!({ "record": record_json(&record) })))
}

fn record_json(record: &AttendanceRecord) -> Value {
    json!({
        "id": record.id,
        "candidate_id": record.candidate_id,
        "day": record.day.to_string(),
        "punch_in": record.punch_in.to_rfc3339(),
        "punch_out": record.punch_out.map(|t| t.to_rfc3339()),
        "timezone": record.timezone,
        "duration_seconds": record.duration_seconds,
        "status": record.status.as_str(),
        "note": record.note,
    })
}
