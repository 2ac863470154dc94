//! Meeting lifecycle: scheduling, joining, expiry and ending.

pub mod lifecycle;
pub mod model;

pub use lifecycle::{CreateMeetingRequest, JoinResult, MeetingLifecycle, StreamCredential};
pub use model::{
    Meeting, MeetingStatus, Participant, ParticipantRole, RecordingOutput, RecordingSession,
    RecordingStatus, TranscriptionJob, TranscriptionStatus,
};
