//! REST API server for Roomcast.
//!
//! Provides HTTP endpoints for:
//! - Meeting lifecycle (create, get, join, leave, end, delete)
//! - Recording control (start, stop, finalize)
//! - Transcription (start, edit, download URL)
//! - Attendance (punch in, punch out)

pub mod error;
pub mod routes;

use anyhow::Result;
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;

use crate::meeting::MeetingLifecycle;
use crate::recording::RecordingOrchestrator;
use crate::transcription::TranscriptionPipeline;

/// Shared service handles for all routes.
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<MeetingLifecycle>,
    pub orchestrator: Arc<RecordingOrchestrator>,
    pub pipeline: Option<Arc<TranscriptionPipeline>>,
}

pub struct ApiServer {
    port: u16,
    state: AppState,
}

impl ApiServer {
    pub fn new(port: u16, state: AppState) -> Self {
        Self { port, state }
    }

    pub async fn start(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(status))
            .route("/version", get(version))
            .merge(routes::meetings::router(self.state.clone()))
            .merge(routes::recording::router(self.state.clone()))
            .merge(routes::transcription::router(self.state.clone()))
            .merge(routes::attendance::router())
            .layer(ServiceBuilder::new());

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", self.port)).await?;

        info!("API server listening on http://127.0.0.1:{}", self.port);
        info!("Endpoints:");
        info!("  GET    /                                     - Service info");
        info!("  POST   /meetings                             - Create meeting");
        info!("  GET    /meetings                             - List meetings");
        info!("  GET    /meetings/:id                         - Get meeting");
        info!("  GET    /meetings/by-token/:token             - Get meeting by join token");
        info!("  POST   /meetings/:id/join                    - Join meeting");
        info!("  POST   /meetings/:id/leave                   - Leave meeting");
        info!("  POST   /meetings/:id/end                     - End meeting");
        info!("  DELETE /meetings/:id                         - Delete meeting (owner)");
        info!("  POST   /meetings/:id/recording/start         - Start recording");
        info!("  POST   /meetings/:id/recording/stop          - Stop recording");
        info!("  POST   /meetings/:id/recording/finalize      - Upload captured artifact");
        info!("  POST   /meetings/:id/transcription/start     - Start transcription");
        info!("  PUT    /meetings/:id/transcription           - Edit transcript (owner)");
        info!("  GET    /meetings/:id/transcription/download-url - Transcript download URL");
        info!("  POST   /attendance/punch-in                  - Open attendance session");
        info!("  POST   /attendance/punch-out                 - Close attendance session");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "roomcast",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn version() -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "name": "roomcast"
    }))
}
