//! Speech-to-text: provider contract and the pipeline that drives jobs to
//! completion and formats the result.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod assembly_api;
pub mod pipeline;

pub use assembly_api::AssemblyAiProvider;
pub use pipeline::{FormattedTranscript, TranscriptionPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// A speaker-labeled segment of the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: String,
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// One poll of an async transcription job.
#[derive(Debug, Clone)]
pub struct JobPoll {
    pub status: JobStatus,
    pub text: Option<String>,
    pub words: Vec<Word>,
    pub utterances: Option<Vec<Utterance>>,
    pub error: Option<String>,
    /// Raw provider payload, persisted alongside the formatted transcript.
    pub raw: serde_json::Value,
}

/// Async speech-to-text jobs: submit an audio URL, poll until done.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn submit(&self, audio_url: &str, language: &str, speaker_labels: bool)
        -> Result<String>;

    async fn poll(&self, job_id: &str) -> Result<JobPoll>;
}
