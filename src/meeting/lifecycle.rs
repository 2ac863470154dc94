//! Meeting lifecycle service.
//!
//! Drives the scheduled → active → ended state machine. Reads are allowed to
//! have write side effects: every load re-evaluates expiry and persists the
//! forced transition if it fired, so stale meetings heal themselves on the
//! next touch instead of waiting for the sweep.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MeetingConfig;
use crate::db::MeetingRepository;
use crate::error::{CoreError, CoreResult};

use super::model::{Meeting, MeetingStatus, Participant, ParticipantRole};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMeetingRequest {
    pub title: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<u32>,
    pub max_participants: Option<u32>,
    pub auto_transcribe: Option<bool>,
}

/// Credential scoped to a meeting's stream channel, handed to a joining
/// participant so the relay will accept their publish/subscribe.
#[derive(Debug, Clone, Serialize)]
pub struct StreamCredential {
    pub channel: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct JoinResult {
    pub meeting: Meeting,
    pub participant: Participant,
    pub credential: StreamCredential,
}

pub struct MeetingLifecycle {
    defaults: MeetingConfig,
}

impl MeetingLifecycle {
    pub fn new(defaults: MeetingConfig) -> Self {
        Self { defaults }
    }

    pub fn create(
        &self,
        conn: &Connection,
        request: CreateMeetingRequest,
        owner_id: &str,
    ) -> CoreResult<Meeting> {
        let meeting = Meeting::new(
            request.title,
            owner_id.to_string(),
            request.scheduled_at,
            request
                .duration_minutes
                .unwrap_or(self.defaults.default_duration_minutes),
            request
                .max_participants
                .unwrap_or(self.defaults.max_participants),
            request.auto_transcribe.unwrap_or(true),
        );

        MeetingRepository::insert(conn, &meeting).map_err(CoreError::Internal)?;
        info!(
            "Created meeting {} ({:?}, {} min)",
            meeting.id, meeting.scheduled_at, meeting.duration_minutes
        );
        Ok(meeting)
    }

    /// Load a meeting by ID, healing expiry on the way out.
    pub fn get(&self, conn: &Connection, meeting_id: &str) -> CoreResult<Meeting> {
        let meeting = MeetingRepository::get(conn, meeting_id)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound(format!("meeting {}", meeting_id)))?;
        self.heal_expiry(conn, meeting)
    }

    /// Load a meeting by join token, healing expiry on the way out.
    pub fn get_by_token(&self, conn: &Connection, join_token: &str) -> CoreResult<Meeting> {
        let meeting = MeetingRepository::get_by_token(conn, join_token)
            .map_err(CoreError::Internal)?
            .ok_or_else(|| CoreError::NotFound("meeting for token".to_string()))?;
        self.heal_expiry(conn, meeting)
    }

    pub fn list(&self, conn: &Connection, limit: usize) -> CoreResult<Vec<Meeting>> {
        MeetingRepository::list(conn, limit).map_err(CoreError::Internal)
    }

    /// Join a meeting. Upserts the participant by email (rejoin reactivates),
    /// activates the meeting on its first active participant, and issues a
    /// channel-scoped stream credential.
    pub fn join(
        &self,
        conn: &Connection,
        meeting_id: &str,
        join_token: &str,
        name: &str,
        email: &str,
    ) -> CoreResult<JoinResult> {
        let now = Utc::now();
        let mut meeting = self.get(conn, meeting_id)?;

        if meeting.join_token != join_token {
            return Err(CoreError::NotFound(format!("meeting {}", meeting_id)));
        }

        if !meeting.can_join_at(now) {
            return Err(CoreError::InvalidState(format!(
                "meeting {} cannot be joined (status: {})",
                meeting_id,
                meeting.status.as_str()
            )));
        }

        let rejoining = meeting.find_participant_mut(email).is_some();
        if !rejoining && meeting.current_participants >= meeting.max_participants {
            return Err(CoreError::Capacity(format!(
                "meeting {} is full ({} participants)",
                meeting_id, meeting.max_participants
            )));
        }

        if let Some(existing) = meeting.find_participant_mut(email) {
            existing.is_active = true;
            existing.left_at = None;
            existing.joined_at = now;
            existing.name = name.to_string();
        } else {
            let role = if meeting.participants.is_empty() {
                ParticipantRole::Host
            } else {
                ParticipantRole::Participant
            };
            meeting.participants.push(Participant {
                name: name.to_string(),
                email: email.to_string(),
                role,
                joined_at: now,
                left_at: None,
                is_active: true,
            });
            meeting.total_joined += 1;
        }

        meeting.current_participants = meeting.active_participant_count();

        // First active participant activates the meeting and re-anchors expiry.
        if meeting.status == MeetingStatus::Scheduled && meeting.current_participants == 1 {
            meeting.status = MeetingStatus::Active;
            meeting.started_at = Some(now);
            meeting.recompute_expires_at(now);
            info!("Meeting {} activated by first join", meeting.id);
        }

        MeetingRepository::save(conn, &mut meeting)?;

        let participant = meeting
            .participants
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned()
            .expect("participant just upserted");

        let credential = StreamCredential {
            channel: meeting.channel.clone(),
            token: Uuid::new_v4().simple().to_string(),
            expires_at: meeting.expires_at,
        };

        debug!("Participant {} joined meeting {}", email, meeting.id);
        Ok(JoinResult {
            meeting,
            participant,
            credential,
        })
    }

    /// Mark a participant as left. When the last active participant leaves an
    /// active meeting, the meeting ends.
    pub fn leave(&self, conn: &Connection, meeting_id: &str, email: &str) -> CoreResult<Meeting> {
        let now = Utc::now();
        let mut meeting = self.get(conn, meeting_id)?;

        let participant = meeting
            .find_participant_mut(email)
            .ok_or_else(|| CoreError::NotFound(format!("participant {}", email)))?;
        participant.is_active = false;
        participant.left_at = Some(now);

        meeting.current_participants = meeting.active_participant_count();

        if meeting.current_participants == 0 && meeting.status == MeetingStatus::Active {
            meeting.end_at(now);
            info!("Meeting {} ended: last participant left", meeting.id);
        }

        MeetingRepository::save(conn, &mut meeting)?;
        Ok(meeting)
    }

    /// Explicitly end a meeting. Caller authorization is decided upstream.
    pub fn end(&self, conn: &Connection, meeting_id: &str, by_user: &str) -> CoreResult<Meeting> {
        let mut meeting = self.get(conn, meeting_id)?;

        if meeting.status.is_terminal() {
            return Err(CoreError::InvalidState(format!(
                "meeting {} is already {}",
                meeting_id,
                meeting.status.as_str()
            )));
        }

        meeting.end_at(Utc::now());
        MeetingRepository::save(conn, &mut meeting)?;
        info!("Meeting {} ended by {}", meeting.id, by_user);
        Ok(meeting)
    }

    /// Hard-delete, reserved for the meeting owner.
    pub fn delete(&self, conn: &Connection, meeting_id: &str, by_user: &str) -> CoreResult<()> {
        let meeting = self.get(conn, meeting_id)?;
        if meeting.owner_id != by_user {
            return Err(CoreError::Forbidden(format!(
                "only the owner may delete meeting {}",
                meeting_id
            )));
        }
        MeetingRepository::delete(conn, meeting_id).map_err(CoreError::Internal)?;
        info!("Meeting {} deleted by owner", meeting_id);
        Ok(())
    }

    /// Apply the self-healing expiry transition and persist it if it fired.
    fn heal_expiry(&self, conn: &Connection, mut meeting: Meeting) -> CoreResult<Meeting> {
        if meeting.auto_end_if_expired() {
            info!("Meeting {} auto-ended on read (expired)", meeting.id);
            match MeetingRepository::save(conn, &mut meeting) {
                Ok(()) => {}
                // Another writer raced us; their copy is at least as fresh.
                Err(CoreError::Conflict(_)) => {
                    if let Some(fresh) =
                        MeetingRepository::get(conn, &meeting.id).map_err(CoreError::Internal)?
                    {
                        meeting = fresh;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(meeting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::meeting::model::RecordingStatus;
    use chrono::Duration;

    fn setup() -> (Connection, MeetingLifecycle) {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        (conn, MeetingLifecycle::new(MeetingConfig::default()))
    }

    fn create_meeting(conn: &Connection, lifecycle: &MeetingLifecycle) -> Meeting {
        lifecycle
            .create(
                conn,
                CreateMeetingRequest {
                    title: "Design review".to_string(),
                    duration_minutes: Some(60),
                    ..Default::default()
                },
                "owner-1",
            )
            .unwrap()
    }

    #[test]
    fn test_create_generates_identity() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);
        assert_eq!(meeting.status, MeetingStatus::Scheduled);
        assert!(!meeting.join_token.is_empty());
        assert!(!meeting.channel.is_empty());
        assert_eq!(meeting.recording.status, RecordingStatus::Idle);
    }

    #[test]
    fn test_join_activates_meeting() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        let result = lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();

        assert_eq!(result.meeting.status, MeetingStatus::Active);
        assert!(result.meeting.started_at.is_some());
        assert!(result.meeting.expires_at.is_some());
        assert_eq!(result.meeting.current_participants, 1);
        assert_eq!(result.meeting.total_joined, 1);
        assert_eq!(result.participant.role, ParticipantRole::Host);
        assert_eq!(result.credential.channel, result.meeting.channel);
        assert!(!result.credential.token.is_empty());
    }

    #[test]
    fn test_join_bad_token_is_not_found() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        let err = lifecycle
            .join(&conn, &meeting.id, "wrong-token", "Ada", "ada@example.com")
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_rejoin_reactivates_instead_of_duplicating() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();
        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Grace", "grace@example.com")
            .unwrap();
        lifecycle.leave(&conn, &meeting.id, "ada@example.com").unwrap();

        let result = lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada L.", "ada@example.com")
            .unwrap();

        assert_eq!(result.meeting.participants.len(), 2);
        assert_eq!(result.meeting.total_joined, 2);
        assert_eq!(result.meeting.current_participants, 2);
        assert_eq!(result.participant.name, "Ada L.");
        assert!(result.participant.is_active);
    }

    #[test]
    fn test_join_capacity() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        let lifecycle = MeetingLifecycle::new(MeetingConfig {
            max_participants: 1,
            default_duration_minutes: 60,
        });
        let meeting = create_meeting(&conn, &lifecycle);

        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();

        let err = lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Grace", "grace@example.com")
            .unwrap_err();
        assert!(matches!(err, CoreError::Capacity(_)));

        // Rejoin of an existing participant is not a capacity violation.
        lifecycle.leave(&conn, &meeting.id, "ada@example.com").unwrap();
        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();
    }

    #[test]
    fn test_join_before_scheduled_start_is_invalid() {
        let (conn, lifecycle) = setup();
        let meeting = lifecycle
            .create(
                &conn,
                CreateMeetingRequest {
                    title: "Future".to_string(),
                    scheduled_at: Some(Utc::now() + Duration::hours(2)),
                    duration_minutes: Some(30),
                    ..Default::default()
                },
                "owner-1",
            )
            .unwrap();

        let err = lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_last_leave_ends_meeting() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();
        let ended = lifecycle.leave(&conn, &meeting.id, "ada@example.com").unwrap();

        assert_eq!(ended.status, MeetingStatus::Ended);
        assert!(ended.ended_at.is_some());
        assert_eq!(ended.current_participants, 0);
    }

    #[test]
    fn test_leave_unknown_participant() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        let err = lifecycle
            .leave(&conn, &meeting.id, "ghost@example.com")
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_end_marks_all_inactive() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();
        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Grace", "grace@example.com")
            .unwrap();

        let ended = lifecycle.end(&conn, &meeting.id, "owner-1").unwrap();
        assert_eq!(ended.status, MeetingStatus::Ended);
        assert_eq!(ended.current_participants, 0);
        assert!(ended.participants.iter().all(|p| !p.is_active));

        let err = lifecycle.end(&conn, &meeting.id, "owner-1").unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_read_heals_expired_meeting() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);
        lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Ada", "ada@example.com")
            .unwrap();

        // Rewind the expiry so the meeting is past its window.
        let mut stale = MeetingRepository::get(&conn, &meeting.id).unwrap().unwrap();
        stale.expires_at = Some(Utc::now() - Duration::minutes(1));
        MeetingRepository::save(&conn, &mut stale).unwrap();

        let healed = lifecycle.get(&conn, &meeting.id).unwrap();
        assert_eq!(healed.status, MeetingStatus::Ended);

        // The transition was persisted, not just applied in memory.
        let reloaded = MeetingRepository::get(&conn, &meeting.id).unwrap().unwrap();
        assert_eq!(reloaded.status, MeetingStatus::Ended);

        // And a join after expiry is rejected.
        let err = lifecycle
            .join(&conn, &meeting.id, &meeting.join_token, "Late", "late@example.com")
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState(_)));
    }

    #[test]
    fn test_get_by_token() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        let found = lifecycle.get_by_token(&conn, &meeting.join_token).unwrap();
        assert_eq!(found.id, meeting.id);

        let err = lifecycle.get_by_token(&conn, "nope").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_owner_only() {
        let (conn, lifecycle) = setup();
        let meeting = create_meeting(&conn, &lifecycle);

        let err = lifecycle.delete(&conn, &meeting.id, "intruder").unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        lifecycle.delete(&conn, &meeting.id, "owner-1").unwrap();
        let err = lifecycle.get(&conn, &meeting.id).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
