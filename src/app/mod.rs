//! Service wiring: config, storage, services, maintenance sweeps, API server.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{ApiServer, AppState};
use crate::config::Config;
use crate::meeting::MeetingLifecycle;
use crate::recording::RecordingOrchestrator;
use crate::scheduler::{sweeps, SchedulerRunner};
use crate::storage::{FsObjectStorage, ObjectStorage};
use crate::transcription::{AssemblyAiProvider, TranscriptionPipeline};

pub async fn run_service() -> Result<()> {
    info!("Starting Roomcast service");

    let config = Config::load()?;

    // Open once up front so migrations run before anything else.
    crate::db::init_db()?;

    let storage_root = if config.storage.root_dir.is_empty() {
        crate::global::objects_dir()?
    } else {
        PathBuf::from(&config.storage.root_dir)
    };
    let storage: Arc<dyn ObjectStorage> = Arc::new(FsObjectStorage::new(storage_root));
    let signed_url_ttl = config.storage.signed_url_ttl_seconds;

    let pipeline = match &config.transcription.api_key {
        Some(api_key) => {
            let provider = Arc::new(AssemblyAiProvider::new(
                api_key.clone(),
                config.transcription.api_endpoint.clone(),
            ));
            Some(Arc::new(TranscriptionPipeline::new(
                Arc::clone(&storage),
                provider,
                config.transcription.clone(),
                signed_url_ttl,
            )))
        }
        None => {
            warn!("No transcription API key configured; transcription is disabled");
            None
        }
    };

    let lifecycle = Arc::new(MeetingLifecycle::new(config.meeting.clone()));
    let orchestrator = Arc::new(RecordingOrchestrator::new(
        Arc::clone(&storage),
        config.recording.clone(),
        signed_url_ttl,
        pipeline.clone(),
    ));

    let mut scheduler = SchedulerRunner::new();
    scheduler.schedule(
        "meeting-expiry",
        Duration::from_secs(config.scheduler.meeting_expiry_interval_minutes * 60),
        || sweeps::expire_meetings(),
    );
    let threshold_hours = config.scheduler.attendance_threshold_hours;
    scheduler.schedule(
        "attendance-auto-punch-out",
        Duration::from_secs(config.scheduler.attendance_interval_minutes * 60),
        move || sweeps::auto_punch_out(threshold_hours),
    );

    let state = AppState {
        lifecycle,
        orchestrator,
        pipeline,
    };

    info!("Roomcast is ready!");

    let result = ApiServer::new(config.api.port, state).start().await;
    scheduler.shutdown();
    result
}
