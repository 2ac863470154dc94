//! Meeting document model.
//!
//! A meeting owns at most one recording session and one transcription job.
//! `current_participants` always mirrors the count of active participants,
//! and `expires_at` is derived from (started_at ?? scheduled_at ?? now) plus
//! the meeting duration; it is recomputed whenever those inputs change.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Active => "active",
            Self::Ended => "ended",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub email: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Idle,
    Starting,
    Recording,
    Stopping,
    Completed,
    Failed,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Recording => "recording",
            Self::Stopping => "stopping",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Requested output parameters for a recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingOutput {
    pub format: String,
    pub resolution: String,
    pub fps: u32,
    pub bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    pub status: RecordingStatus,
    pub recording_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub output: Option<RecordingOutput>,
    pub storage_key: Option<String>,
    pub storage_url: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self {
            status: RecordingStatus::Idle,
            recording_id: None,
            started_at: None,
            stopped_at: None,
            duration_seconds: None,
            output: None,
            storage_key: None,
            storage_url: None,
            size_bytes: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionStatus {
    Idle,
    Processing,
    Completed,
    Failed,
}

impl TranscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionJob {
    pub status: TranscriptionStatus,
    pub job_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub language: Option<String>,
    pub storage_key: Option<String>,
    pub storage_url: Option<String>,
    pub size_bytes: Option<u64>,
    /// Raw provider payload, kept for reprocessing and audit.
    pub raw: Option<serde_json::Value>,
    pub text: Option<String>,
    pub speakers: Vec<String>,
    /// Provider speaker label → participant name.
    pub speaker_mapping: HashMap<String, String>,
    pub last_edited_at: Option<DateTime<Utc>>,
    pub last_edited_by: Option<String>,
    pub error: Option<String>,
}

impl Default for TranscriptionJob {
    fn default() -> Self {
        Self {
            status: TranscriptionStatus::Idle,
            job_id: None,
            started_at: None,
            completed_at: None,
            language: None,
            storage_key: None,
            storage_url: None,
            size_bytes: None,
            raw: None,
            text: None,
            speakers: Vec::new(),
            speaker_mapping: HashMap::new(),
            last_edited_at: None,
            last_edited_by: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    /// Logical live-stream namespace the participants publish/subscribe to.
    pub channel: String,
    /// Opaque credential granting entry, independent of user authentication.
    pub join_token: String,
    pub status: MeetingStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub max_participants: u32,
    pub participants: Vec<Participant>,
    pub current_participants: u32,
    pub total_joined: u32,
    pub auto_transcribe: bool,
    pub recording: RecordingSession,
    pub transcription: TranscriptionJob,
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency version, managed by the repository.
    #[serde(skip)]
    pub version: i64,
}

impl Meeting {
    pub fn new(
        title: String,
        owner_id: String,
        scheduled_at: Option<DateTime<Utc>>,
        duration_minutes: u32,
        max_participants: u32,
        auto_transcribe: bool,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let mut meeting = Self {
            channel: format!("meeting-{}", &id[..8]),
            join_token: Uuid::new_v4().simple().to_string(),
            id,
            owner_id,
            title,
            status: MeetingStatus::Scheduled,
            scheduled_at,
            duration_minutes,
            started_at: None,
            expires_at: None,
            ended_at: None,
            max_participants,
            participants: Vec::new(),
            current_participants: 0,
            total_joined: 0,
            auto_transcribe,
            recording: RecordingSession::default(),
            transcription: TranscriptionJob::default(),
            created_at: Utc::now(),
            version: 0,
        };

        if meeting.scheduled_at.is_some() {
            meeting.recompute_expires_at(Utc::now());
        }
        meeting
    }

    /// Recompute `expires_at` from the current temporal inputs. Must be
    /// called whenever `started_at`, `scheduled_at` or the duration change.
    pub fn recompute_expires_at(&mut self, now: DateTime<Utc>) {
        let anchor = self.started_at.or(self.scheduled_at).unwrap_or(now);
        self.expires_at = Some(anchor + Duration::minutes(self.duration_minutes as i64));
    }

    pub fn active_participant_count(&self) -> u32 {
        self.participants.iter().filter(|p| p.is_active).count() as u32
    }

    pub fn find_participant_mut(&mut self, email: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.email.eq_ignore_ascii_case(email))
    }

    pub fn can_join(&self) -> bool {
        self.can_join_at(Utc::now())
    }

    /// A meeting is joinable while scheduled or active, not yet expired,
    /// and not before its scheduled start.
    pub fn can_join_at(&self, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, MeetingStatus::Scheduled | MeetingStatus::Active) {
            return false;
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return false;
            }
        }
        if let Some(scheduled_at) = self.scheduled_at {
            if scheduled_at > now {
                return false;
            }
        }
        true
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= now && !self.status.is_terminal(),
            None => false,
        }
    }

    /// Force-end an expired active meeting. Returns true when a transition
    /// fired and the caller must persist the document.
    pub fn auto_end_if_expired(&mut self) -> bool {
        self.auto_end_if_expired_at(Utc::now())
    }

    pub fn auto_end_if_expired_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_expired_at(now) && self.status == MeetingStatus::Active {
            self.end_at(now);
            return true;
        }
        false
    }

    /// Transition to ended: all participants inactive, counts zeroed.
    pub fn end_at(&mut self, now: DateTime<Utc>) {
        self.status = MeetingStatus::Ended;
        self.ended_at = Some(now);
        for participant in &mut self.participants {
            if participant.is_active {
                participant.is_active = false;
                participant.left_at = Some(now);
            }
        }
        self.current_participants = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meeting_with_duration(duration_minutes: u32) -> Meeting {
        Meeting::new(
            "Standup".to_string(),
            "owner-1".to_string(),
            None,
            duration_minutes,
            50,
            true,
        )
    }

    #[test]
    fn test_new_meeting_identity() {
        let meeting = meeting_with_duration(60);
        assert_eq!(meeting.status, MeetingStatus::Scheduled);
        assert_eq!(meeting.join_token.len(), 32);
        assert!(meeting.channel.starts_with("meeting-"));
        assert!(meeting.expires_at.is_none());
        assert_eq!(meeting.recording.status, RecordingStatus::Idle);
        assert_eq!(meeting.transcription.status, TranscriptionStatus::Idle);
    }

    #[test]
    fn test_new_scheduled_meeting_precomputes_expiry() {
        let scheduled = Utc::now() + Duration::hours(1);
        let meeting = Meeting::new(
            "Planning".to_string(),
            "owner-1".to_string(),
            Some(scheduled),
            30,
            50,
            false,
        );
        assert_eq!(meeting.expires_at, Some(scheduled + Duration::minutes(30)));
    }

    #[test]
    fn test_recompute_prefers_started_at() {
        let mut meeting = meeting_with_duration(60);
        let now = Utc::now();
        meeting.scheduled_at = Some(now - Duration::minutes(10));
        meeting.started_at = Some(now);
        meeting.recompute_expires_at(now);
        assert_eq!(meeting.expires_at, Some(now + Duration::minutes(60)));
    }

    #[test]
    fn test_can_join_states() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        assert!(meeting.can_join_at(now));

        meeting.status = MeetingStatus::Ended;
        assert!(!meeting.can_join_at(now));

        meeting.status = MeetingStatus::Cancelled;
        assert!(!meeting.can_join_at(now));
    }

    #[test]
    fn test_can_join_respects_expiry_regardless_of_status() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        meeting.status = MeetingStatus::Active;
        meeting.expires_at = Some(now - Duration::seconds(1));
        assert!(!meeting.can_join_at(now));
    }

    #[test]
    fn test_can_join_before_scheduled_start() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        meeting.scheduled_at = Some(now + Duration::minutes(5));
        meeting.recompute_expires_at(now);
        assert!(!meeting.can_join_at(now));
        assert!(meeting.can_join_at(now + Duration::minutes(5)));
    }

    #[test]
    fn test_is_expired_terminal_states() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        meeting.expires_at = Some(now - Duration::minutes(1));

        meeting.status = MeetingStatus::Active;
        assert!(meeting.is_expired_at(now));

        meeting.status = MeetingStatus::Ended;
        assert!(!meeting.is_expired_at(now));

        meeting.status = MeetingStatus::Cancelled;
        assert!(!meeting.is_expired_at(now));
    }

    #[test]
    fn test_auto_end_if_expired() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        meeting.status = MeetingStatus::Active;
        meeting.started_at = Some(now - Duration::minutes(61));
        meeting.recompute_expires_at(now);
        meeting.participants.push(Participant {
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            role: ParticipantRole::Host,
            joined_at: now - Duration::minutes(61),
            left_at: None,
            is_active: true,
        });
        meeting.current_participants = 1;

        assert!(meeting.auto_end_if_expired_at(now));
        assert_eq!(meeting.status, MeetingStatus::Ended);
        assert_eq!(meeting.current_participants, 0);
        assert!(!meeting.participants[0].is_active);
        assert!(meeting.participants[0].left_at.is_some());

        // Second call is a no-op.
        assert!(!meeting.auto_end_if_expired_at(now));
    }

    #[test]
    fn test_auto_end_skips_scheduled_meetings() {
        let now = Utc::now();
        let mut meeting = meeting_with_duration(60);
        meeting.scheduled_at = Some(now - Duration::minutes(120));
        meeting.recompute_expires_at(now);

        // Expired but never started: stays scheduled, nothing to persist.
        assert!(meeting.is_expired_at(now));
        assert!(!meeting.auto_end_if_expired_at(now));
        assert_eq!(meeting.status, MeetingStatus::Scheduled);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&MeetingStatus::Active).unwrap(),
            "\"active\""
        );
        let parsed: RecordingStatus = serde_json::from_str("\"stopping\"").unwrap();
        assert_eq!(parsed, RecordingStatus::Stopping);
    }

    #[test]
    fn test_meeting_document_roundtrip() {
        let meeting = meeting_with_duration(45);
        let json = serde_json::to_string(&meeting).unwrap();
        let parsed: Meeting = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, meeting.id);
        assert_eq!(parsed.join_token, meeting.join_token);
        assert_eq!(parsed.duration_minutes, 45);
        // Version is repository-managed, not part of the document.
        assert_eq!(parsed.version, 0);
    }
}
