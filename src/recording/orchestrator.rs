//! Recording session orchestration.
//!
//! Drives one meeting's recording through idle → starting → recording →
//! stopping → completed/failed. Capture itself runs in a separate ffmpeg
//! process; `start` never blocks on it, and `stop` blocks only for the
//! encoder's bounded teardown window. The captured artifact arrives through
//! `finalize`, which validates, uploads and optionally kicks off
//! transcription.

use anyhow::anyhow;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::RecordingConfig;
use crate::db::MeetingRepository;
use crate::error::{CoreError, CoreResult};
use crate::meeting::model::{
    Meeting, MeetingStatus, RecordingOutput, RecordingSession, RecordingStatus,
};
use crate::storage::ObjectStorage;
use crate::transcription::TranscriptionPipeline;

use super::encoder::{EncodingParams, MediaEncoderProcess};

/// Per-request output overrides; anything unset falls back to config
/// defaults. A stream URL makes this a process-backed capture.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct StartRecordingRequest {
    pub format: Option<String>,
    pub resolution: Option<String>,
    pub fps: Option<u32>,
    pub bitrate: Option<String>,
    pub stream_url: Option<String>,
}

pub struct RecordingOrchestrator {
    storage: Arc<dyn ObjectStorage>,
    defaults: RecordingConfig,
    signed_url_ttl: u64,
    pipeline: Option<Arc<TranscriptionPipeline>>,
    /// Live capture processes keyed by meeting id.
    captures: Mutex<HashMap<String, MediaEncoderProcess>>,
}

impl RecordingOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        defaults: RecordingConfig,
        signed_url_ttl: u64,
        pipeline: Option<Arc<TranscriptionPipeline>>,
    ) -> Self {
        Self {
            storage,
            defaults,
            signed_url_ttl,
            pipeline,
            captures: Mutex::new(HashMap::new()),
        }
    }

    /// Begin a recording session for an active meeting. Returns immediately;
    /// when a stream URL is supplied the capture process is launched in a
    /// detached task.
    ///
    /// Takes the connection mutably so the returned future stays `Send`:
    /// a shared `&Connection` may not cross an await point.
    pub async fn start(
        self: &Arc<Self>,
        conn: &mut Connection,
        meeting_id: &str,
        request: StartRecordingRequest,
    ) -> CoreResult<Meeting> {
        let mut meeting = load_meeting(conn, meeting_id)?;

        if meeting.status != MeetingStatus::Active {
            return Err(CoreError::InvalidState(format!(
                "cannot record meeting {} while {}",
                meeting_id,
                meeting.status.as_str()
            )));
        }
        if matches!(
            meeting.recording.status,
            RecordingStatus::Starting | RecordingStatus::Recording
        ) {
            return Err(CoreError::Conflict(format!(
                "recording for meeting {} is already {}",
                meeting_id,
                meeting.recording.status.as_str()
            )));
        }

        let output = RecordingOutput {
            format: request.format.unwrap_or_else(|| self.defaults.format.clone()),
            resolution: request
                .resolution
                .unwrap_or_else(|| self.defaults.resolution.clone()),
            fps: request.fps.unwrap_or(self.defaults.fps),
            bitrate: request
                .bitrate
                .unwrap_or_else(|| self.defaults.bitrate.clone()),
        };

        let recording_id = uuid::Uuid::new_v4().to_string();
        meeting.recording = RecordingSession {
            // Capture runs in its own process, so starting collapses into
            // recording without waiting on it.
            status: RecordingStatus::Recording,
            recording_id: Some(recording_id.clone()),
            started_at: Some(Utc::now()),
            output: Some(output.clone()),
            ..RecordingSession::default()
        };
        MeetingRepository::save(conn, &mut meeting)?;

        info!(
            "Recording {} started for meeting {}",
            recording_id, meeting_id
        );

        if let Some(stream_url) = request.stream_url {
            let orchestrator = Arc::clone(self);
            let meeting_id = meeting_id.to_string();
            tokio::spawn(async move {
                orchestrator
                    .launch_capture(&meeting_id, &recording_id, &stream_url, &output)
                    .await;
            });
        }

        Ok(meeting)
    }

    /// Detached capture launch; a launch failure marks the session failed.
    async fn launch_capture(
        &self,
        meeting_id: &str,
        recording_id: &str,
        stream_url: &str,
        output: &RecordingOutput,
    ) {
        let result = async {
            let ffmpeg = MediaEncoderProcess::resolve_binary(&self.defaults.ffmpeg_path)?;
            let output_path = crate::global::recordings_dir()?
                .join(meeting_id)
                .join(format!("{}.{}", recording_id, output.format));
            let params = EncodingParams {
                video_bitrate: output.bitrate.clone(),
                fps: output.fps,
                resolution: output.resolution.clone(),
            };
            MediaEncoderProcess::launch(&ffmpeg, stream_url, &output_path, &params).await
        }
        .await;

        match result {
            Ok(process) => {
                self.captures
                    .lock()
                    .await
                    .insert(meeting_id.to_string(), process);
            }
            Err(e) => {
                error!(
                    "Capture launch failed for meeting {}: {}",
                    meeting_id, e
                );
                self.persist_recording_failure(meeting_id, &e.to_string());
            }
        }
    }

    /// Stop the session: stopping + stopped_at + duration, then tear down
    /// the capture process when one is running.
    pub async fn stop(&self, conn: &mut Connection, meeting_id: &str) -> CoreResult<Meeting> {
        let mut meeting = load_meeting(conn, meeting_id)?;

        if !matches!(
            meeting.recording.status,
            RecordingStatus::Starting | RecordingStatus::Recording
        ) {
            return Err(CoreError::InvalidState(format!(
                "recording for meeting {} is {} and cannot be stopped",
                meeting_id,
                meeting.recording.status.as_str()
            )));
        }

        let now = Utc::now();
        meeting.recording.status = RecordingStatus::Stopping;
        meeting.recording.stopped_at = Some(now);
        meeting.recording.duration_seconds = meeting
            .recording
            .started_at
            .map(|started| (now - started).num_seconds());
        MeetingRepository::save(conn, &mut meeting)?;

        info!("Recording stopping for meeting {}", meeting_id);

        let capture = self.captures.lock().await.remove(meeting_id);
        if let Some(mut capture) = capture {
            if !capture.is_running() {
                warn!(
                    "Capture process for meeting {} exited before stop was requested",
                    meeting_id
                );
            }
            match capture.request_stop().await {
                Ok(size) => {
                    info!(
                        "Capture for meeting {} finished ({} bytes on disk)",
                        meeting_id, size
                    );
                }
                Err(e) => {
                    return Err(CoreError::Timeout(format!(
                        "capture teardown for meeting {}: {}",
                        meeting_id, e
                    )));
                }
            }
        }

        Ok(meeting)
    }

    /// Accept the captured artifact, upload it, and complete the session.
    /// Re-finalizing a completed session is a no-op; an invalid declared
    /// format is rejected before any state change.
    pub async fn finalize(
        self: &Arc<Self>,
        conn: &mut Connection,
        meeting_id: &str,
        artifact: &[u8],
        declared_format: &str,
    ) -> CoreResult<Meeting> {
        let mut meeting = load_meeting(conn, meeting_id)?;

        if meeting.recording.status == RecordingStatus::Completed {
            return Ok(meeting);
        }
        if meeting.recording.status != RecordingStatus::Stopping {
            return Err(CoreError::InvalidState(format!(
                "recording for meeting {} is {} and cannot be finalized",
                meeting_id,
                meeting.recording.status.as_str()
            )));
        }

        let content_type = content_type_for(declared_format).ok_or_else(|| {
            CoreError::Unsupported(format!(
                "recording format {:?} is not an accepted audio/video container",
                declared_format
            ))
        })?;

        let recording_id = meeting
            .recording
            .recording_id
            .clone()
            .unwrap_or_else(|| "recording".to_string());
        let key = format!(
            "recordings/{}/{}/{}.{}",
            Utc::now().format("%Y-%m-%d"),
            meeting_id,
            recording_id,
            declared_format
        );

        let metadata = HashMap::from([
            ("meeting_id".to_string(), meeting_id.to_string()),
            ("recording_id".to_string(), recording_id.clone()),
        ]);
        let uploaded = self.storage.put(&key, artifact, content_type, metadata).await;

        match uploaded {
            Ok(stored) => {
                let url = self
                    .storage
                    .signed_get_url(&stored.key, self.signed_url_ttl)
                    .await
                    .map_err(|e| CoreError::ExternalService(e.to_string()))?;

                if let Some(output) = meeting.recording.output.as_mut() {
                    output.format = declared_format.to_string();
                }
                meeting.recording.status = RecordingStatus::Completed;
                meeting.recording.storage_key = Some(stored.key);
                meeting.recording.storage_url = Some(url);
                meeting.recording.size_bytes = Some(stored.size);
                meeting.recording.error = None;
                MeetingRepository::save(conn, &mut meeting)?;

                info!(
                    "Recording {} completed for meeting {} ({} bytes)",
                    recording_id,
                    meeting_id,
                    artifact.len()
                );

                if meeting.auto_transcribe {
                    self.spawn_transcription(meeting_id);
                }

                Ok(meeting)
            }
            Err(e) => {
                meeting.recording.status = RecordingStatus::Failed;
                meeting.recording.error = Some(e.to_string());
                MeetingRepository::save(conn, &mut meeting)?;
                Err(CoreError::ExternalService(format!(
                    "recording upload for meeting {} failed: {}",
                    meeting_id, e
                )))
            }
        }
    }

    /// Kick off auto-transcription in a detached task. Its failure is logged
    /// on the transcription job and never fails the finalize call.
    fn spawn_transcription(&self, meeting_id: &str) {
        let Some(pipeline) = self.pipeline.clone() else {
            warn!(
                "Auto-transcription enabled for meeting {} but no provider is configured",
                meeting_id
            );
            return;
        };
        let meeting_id = meeting_id.to_string();
        tokio::spawn(async move {
            let result = async {
                let mut conn = crate::db::init_db()?;
                pipeline
                    .start(&mut conn, &meeting_id, None)
                    .await
                    .map_err(|e| anyhow!(e))
            }
            .await;
            if let Err(e) = result {
                warn!(
                    "Auto-transcription for meeting {} did not start: {}",
                    meeting_id, e
                );
            }
        });
    }

    /// Load-mutate-save from a background task, tolerating version races.
    fn persist_recording_failure(&self, meeting_id: &str, message: &str) {
        for attempt in 0..3 {
            let result = (|| -> CoreResult<()> {
                let conn = crate::db::init_db().map_err(CoreError::Internal)?;
                let mut meeting = load_meeting(&conn, meeting_id)?;
                meeting.recording.status = RecordingStatus::Failed;
                meeting.recording.error = Some(message.to_string());
                MeetingRepository::save(&conn, &mut meeting)
            })();

            match result {
                Ok(()) => return,
                Err(CoreError::Conflict(_)) if attempt < 2 => continue,
                Err(e) => {
                    error!(
                        "Failed to persist recording failure for meeting {}: {}",
                        meeting_id, e
                    );
                    return;
                }
            }
        }
    }
}

fn load_meeting(conn: &Connection, meeting_id: &str) -> CoreResult<Meeting> {
    MeetingRepository::get(conn, meeting_id)
        .map_err(CoreError::Internal)?
        .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))
}

/// Accepted artifact containers and their MIME types.
fn content_type_for(format: &str) -> Option<&'static str> {
    match format {
        "mp4" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "mkv" => Some("video/x-matroska"),
        "mov" => Some("video/quicktime"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "m4a" => Some("audio/mp4"),
        "ogg" => Some("audio/ogg"),
        "opus" => Some("audio/opus"),
        _ => None,
    }
}
