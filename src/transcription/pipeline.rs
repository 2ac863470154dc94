//! Transcription pipeline.
//!
//! `start` validates state, marks the job processing and returns immediately;
//! the submit → poll → format → upload cycle runs detached from the caller.
//! Background failures are stored on the meeting's transcription job and are
//! observed through status queries, never raised to a request.

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::TranscriptionConfig;
use crate::db::MeetingRepository;
use crate::error::{CoreError, CoreResult};
use crate::meeting::model::{Meeting, RecordingStatus, TranscriptionStatus};
use crate::storage::ObjectStorage;

use super::{JobPoll, JobStatus, TranscriptionProvider, Utterance};

/// Formatted transcript plus the speaker bookkeeping persisted with it.
#[derive(Debug, Clone)]
pub struct FormattedTranscript {
    pub text: String,
    pub speakers: Vec<String>,
    /// Provider speaker label → participant name.
    pub mapping: HashMap<String, String>,
}

/// Result of a successfully driven provider job, before upload.
#[derive(Debug)]
struct JobOutcome {
    job_id: String,
    formatted: FormattedTranscript,
    raw: serde_json::Value,
}

pub struct TranscriptionPipeline {
    storage: Arc<dyn ObjectStorage>,
    provider: Arc<dyn TranscriptionProvider>,
    config: TranscriptionConfig,
    signed_url_ttl: u64,
}

impl TranscriptionPipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        provider: Arc<dyn TranscriptionProvider>,
        config: TranscriptionConfig,
        signed_url_ttl: u64,
    ) -> Self {
        Self {
            storage,
            provider,
            config,
            signed_url_ttl,
        }
    }

    /// Begin transcribing a completed recording. Returns as soon as the job
    /// is marked processing; the rest happens in a detached task.
    ///
    /// Takes the connection mutably so the returned future stays `Send`:
    /// a shared `&Connection` may not cross an await point.
    pub async fn start(
        self: &Arc<Self>,
        conn: &mut Connection,
        meeting_id: &str,
        language: Option<String>,
    ) -> CoreResult<Meeting> {
        let mut meeting = MeetingRepository::get(conn, meeting_id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))?;

        if meeting.recording.status != RecordingStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "meeting {} has no completed recording (recording status: {})",
                meeting_id,
                meeting.recording.status.as_str()
            )));
        }
        let storage_key = meeting.recording.storage_key.clone().ok_or_else(|| {
            CoreError::InvalidState(format!(
                "meeting {} recording has no stored artifact",
                meeting_id
            ))
        })?;

        if matches!(
            meeting.transcription.status,
            TranscriptionStatus::Processing | TranscriptionStatus::Completed
        ) {
            return Err(CoreError::Conflict(format!(
                "transcription for meeting {} is already {}",
                meeting_id,
                meeting.transcription.status.as_str()
            )));
        }

        let audio_url = self
            .storage
            .signed_get_url(&storage_key, self.signed_url_ttl)
            .await
            .map_err(|e| CoreError::ExternalService(e.to_string()))?;

        let language = language.unwrap_or_else(|| self.config.language.clone());
        meeting.transcription.status = TranscriptionStatus::Processing;
        meeting.transcription.started_at = Some(Utc::now());
        meeting.transcription.language = Some(language.clone());
        meeting.transcription.error = None;
        MeetingRepository::save(conn, &mut meeting)?;

        info!("Transcription started for meeting {}", meeting_id);

        let pipeline = Arc::clone(self);
        let snapshot = meeting.clone();
        tokio::spawn(async move {
            pipeline.run_background(snapshot, audio_url, language).await;
        });

        Ok(meeting)
    }

    /// Detached phase: drive the provider job, upload the formatted text,
    /// persist the outcome. Failures land on the entity, not the caller.
    async fn run_background(&self, meeting: Meeting, audio_url: String, language: String) {
        let meeting_id = meeting.id.clone();
        let outcome = drive_job(
            self.provider.as_ref(),
            &self.config,
            &meeting,
            &audio_url,
            &language,
        )
        .await;

        match outcome {
            Ok(outcome) => {
                if let Err(e) = self.store_and_complete(&meeting, outcome).await {
                    error!(
                        "Transcription for meeting {} failed at upload: {}",
                        meeting_id, e
                    );
                    self.persist_failure(&meeting_id, &e.to_string());
                }
            }
            Err(message) => {
                error!("Transcription for meeting {} failed: {}", meeting_id, message);
                self.persist_failure(&meeting_id, &message);
            }
        }
    }

    async fn store_and_complete(&self, meeting: &Meeting, outcome: JobOutcome) -> Result<()> {
        let recording_id = meeting
            .recording
            .recording_id
            .clone()
            .unwrap_or_else(|| "recording".to_string());
        let key = format!(
            "transcripts/{}/{}/{}.txt",
            Utc::now().format("%Y-%m-%d"),
            meeting.id,
            recording_id
        );

        let stored = self
            .storage
            .put(
                &key,
                outcome.formatted.text.as_bytes(),
                "text/plain",
                HashMap::from([("meeting_id".to_string(), meeting.id.clone())]),
            )
            .await?;
        let url = self.storage.signed_get_url(&key, self.signed_url_ttl).await?;

        self.persist_mutation(&meeting.id, move |job| {
            job.status = TranscriptionStatus::Completed;
            job.completed_at = Some(Utc::now());
            job.job_id = Some(outcome.job_id.clone());
            job.storage_key = Some(stored.key.clone());
            job.storage_url = Some(url.clone());
            job.size_bytes = Some(stored.size);
            job.raw = Some(outcome.raw.clone());
            job.text = Some(outcome.formatted.text.clone());
            job.speakers = outcome.formatted.speakers.clone();
            job.speaker_mapping = outcome.formatted.mapping.clone();
            job.error = None;
        });

        info!("Transcription completed for meeting {}", meeting.id);
        Ok(())
    }

    fn persist_failure(&self, meeting_id: &str, message: &str) {
        let message = message.to_string();
        self.persist_mutation(meeting_id, move |job| {
            job.status = TranscriptionStatus::Failed;
            job.completed_at = Some(Utc::now());
            job.error = Some(message.clone());
        });
    }

    /// Load-mutate-save against a fresh connection, retrying version races.
    fn persist_mutation<F>(&self, meeting_id: &str, mutate: F)
    where
        F: Fn(&mut crate::meeting::model::TranscriptionJob),
    {
        for attempt in 0..3 {
            let result = (|| -> CoreResult<()> {
                let conn = crate::db::init_db().map_err(CoreError::Internal)?;
                let mut meeting = MeetingRepository::get(&conn, meeting_id)
                    .map_err(CoreError::Internal)?
                    .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))?;
                mutate(&mut meeting.transcription);
                MeetingRepository::save(&conn, &mut meeting)
            })();

            match result {
                Ok(()) => return,
                Err(CoreError::Conflict(_)) if attempt < 2 => {
                    warn!(
                        "Transcription persist for meeting {} raced (attempt {}), retrying",
                        meeting_id,
                        attempt + 1
                    );
                }
                Err(e) => {
                    error!(
                        "Failed to persist transcription state for meeting {}: {}",
                        meeting_id, e
                    );
                    return;
                }
            }
        }
    }

    /// Overwrite the stored transcript text in place. Owner only.
    pub async fn update(
        &self,
        conn: &mut Connection,
        meeting_id: &str,
        by_user: &str,
        new_text: &str,
    ) -> CoreResult<Meeting> {
        let mut meeting = MeetingRepository::get(conn, meeting_id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))?;

        if meeting.owner_id != by_user {
            return Err(CoreError::Forbidden(format!(
                "only the owner may edit the transcript of meeting {}",
                meeting_id
            )));
        }

        if meeting.transcription.status != TranscriptionStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "transcription for meeting {} is not completed",
                meeting_id
            )));
        }
        let key = meeting.transcription.storage_key.clone().ok_or_else(|| {
            CoreError::InvalidState(format!("meeting {} has no stored transcript", meeting_id))
        })?;

        let stored = self
            .storage
            .put(
                &key,
                new_text.as_bytes(),
                "text/plain",
                HashMap::from([("meeting_id".to_string(), meeting.id.clone())]),
            )
            .await
            .map_err(|e| CoreError::ExternalService(e.to_string()))?;

        meeting.transcription.text = Some(new_text.to_string());
        meeting.transcription.size_bytes = Some(stored.size);
        meeting.transcription.last_edited_at = Some(Utc::now());
        meeting.transcription.last_edited_by = Some(by_user.to_string());
        MeetingRepository::save(conn, &mut meeting)?;

        info!("Transcript for meeting {} edited by {}", meeting_id, by_user);
        Ok(meeting)
    }

    /// Time-limited download URL for the stored transcript. Only `txt` today.
    pub async fn download_url(
        &self,
        conn: &mut Connection,
        meeting_id: &str,
        format: &str,
    ) -> CoreResult<String> {
        if format != "txt" {
            return Err(CoreError::Unsupported(format!(
                "transcript export format {:?} (supported: txt)",
                format
            )));
        }

        let meeting = MeetingRepository::get(conn, meeting_id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))?;

        if meeting.transcription.status != TranscriptionStatus::Completed {
            return Err(CoreError::InvalidState(format!(
                "transcription for meeting {} is not completed",
                meeting_id
            )));
        }
        let key = meeting.transcription.storage_key.ok_or_else(|| {
            CoreError::InvalidState(format!("meeting {} has no stored transcript", meeting_id))
        })?;

        self.storage
            .signed_get_url(&key, self.signed_url_ttl)
            .await
            .map_err(|e| CoreError::ExternalService(e.to_string()))
    }
}

/// Submit and poll one provider job, returning the formatted transcript.
/// Errors are returned as stored failure messages, not raised.
async fn drive_job(
    provider: &dyn TranscriptionProvider,
    config: &TranscriptionConfig,
    meeting: &Meeting,
    audio_url: &str,
    language: &str,
) -> Result<JobOutcome, String> {
    let job_id = provider
        .submit(audio_url, language, config.speaker_labels)
        .await
        .map_err(|e| format!("submit failed: {}", e))?;

    info!("Transcription job {} submitted for meeting {}", job_id, meeting.id);

    let interval = Duration::from_secs(config.poll_interval_seconds);
    for _attempt in 0..config.poll_max_attempts {
        let poll = provider
            .poll(&job_id)
            .await
            .map_err(|e| format!("poll failed: {}", e))?;

        match poll.status {
            JobStatus::Completed => {
                let formatted = match poll.utterances.as_deref() {
                    Some(utterances) if !utterances.is_empty() => {
                        format_transcript(meeting, utterances)
                    }
                    _ => {
                        // No diarization: fall back to plain words/text.
                        let body = poll.text.clone().unwrap_or_else(|| {
                            poll.words
                                .iter()
                                .map(|w| w.text.as_str())
                                .collect::<Vec<_>>()
                                .join(" ")
                        });
                        plain_transcript(meeting, &body)
                    }
                };
                return Ok(JobOutcome {
                    job_id,
                    formatted,
                    raw: poll.raw,
                });
            }
            JobStatus::Error => {
                return Err(poll
                    .error
                    .unwrap_or_else(|| "provider reported an unknown error".to_string()));
            }
            JobStatus::Queued | JobStatus::Processing => {
                tokio::time::sleep(interval).await;
            }
        }
    }

    Err(format!(
        "transcription timed out after {} attempts",
        config.poll_max_attempts
    ))
}

/// Human-readable transcript: header, grouped-by-speaker paragraphs, end
/// marker. Consecutive utterances from one speaker merge into a paragraph;
/// speaker labels map positionally onto participant names.
pub fn format_transcript(meeting: &Meeting, utterances: &[Utterance]) -> FormattedTranscript {
    let mut speakers: Vec<String> = Vec::new();
    for utterance in utterances {
        if !speakers.contains(&utterance.speaker) {
            speakers.push(utterance.speaker.clone());
        }
    }

    let mut mapping = HashMap::new();
    for (i, label) in speakers.iter().enumerate() {
        let name = meeting
            .participants
            .get(i)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("Participant {}", i + 1));
        mapping.insert(label.clone(), name);
    }

    let mut text = transcript_header(meeting);
    let mut current_speaker: Option<&str> = None;
    let mut paragraph = String::new();

    for utterance in utterances {
        if current_speaker == Some(utterance.speaker.as_str()) {
            paragraph.push(' ');
            paragraph.push_str(utterance.text.trim());
        } else {
            if let Some(speaker) = current_speaker {
                push_paragraph(&mut text, &mapping, speaker, &paragraph);
            }
            current_speaker = Some(utterance.speaker.as_str());
            paragraph = utterance.text.trim().to_string();
        }
    }
    if let Some(speaker) = current_speaker {
        push_paragraph(&mut text, &mapping, speaker, &paragraph);
    }

    text.push_str(END_MARKER);
    text.push('\n');

    FormattedTranscript {
        text,
        speakers,
        mapping,
    }
}

/// Transcript without speaker structure, for providers that return only text.
pub fn plain_transcript(meeting: &Meeting, body: &str) -> FormattedTranscript {
    let mut text = transcript_header(meeting);
    let body = body.trim();
    if !body.is_empty() {
        text.push_str(body);
        text.push_str("\n\n");
    }
    text.push_str(END_MARKER);
    text.push('\n');

    FormattedTranscript {
        text,
        speakers: Vec::new(),
        mapping: HashMap::new(),
    }
}

const END_MARKER: &str = "--- End of Transcript ---";

fn transcript_header(meeting: &Meeting) -> String {
    let date = meeting
        .started_at
        .unwrap_or(meeting.created_at)
        .format("%Y-%m-%d %H:%M UTC");
    let duration = meeting.recording.duration_seconds.unwrap_or(0);

    format!(
        "Meeting Transcript\n\
         ==================\n\
         Meeting: {}\n\
         ID: {}\n\
         Date: {}\n\
         Duration: {}\n\
         Participants: {}\n\n",
        meeting.title,
        meeting.id,
        date,
        format_duration(duration),
        meeting.participants.len(),
    )
}

fn format_duration(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

fn push_paragraph(
    text: &mut String,
    mapping: &HashMap<String, String>,
    speaker: &str,
    paragraph: &str,
) {
    let name = mapping
        .get(speaker)
        .cloned()
        .unwrap_or_else(|| speaker.to_string());
    text.push_str(&name);
    text.push_str(":\n");
    text.push_str(paragraph);
    text.push_str("\n\n");
}
