pub mod attendance;
pub mod meetings;
pub mod recording;
pub mod transcription;
