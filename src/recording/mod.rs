//! Recording: per-meeting session state machine, the external capture
//! process, and the upload path into object storage.

pub mod encoder;
pub mod orchestrator;

pub use encoder::{EncodingParams, MediaEncoderProcess};
pub use orchestrator::{RecordingOrchestrator, StartRecordingRequest};
