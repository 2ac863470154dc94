//! AssemblyAI-compatible transcription provider.
//!
//! Submits a publicly reachable audio URL and polls the transcript resource
//! until it completes or errors. Utterances carry speaker labels when
//! diarization was requested.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{JobPoll, JobStatus, TranscriptionProvider, Utterance, Word};

const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com/v2";

/// Request body for creating a transcript
#[derive(Debug, Serialize)]
struct TranscriptRequest {
    audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    language_code: Option<String>,
    speaker_labels: bool,
}

/// Response from transcript creation and polling
#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: JobStatus,
    text: Option<String>,
    words: Option<Vec<Word>>,
    utterances: Option<Vec<Utterance>>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub struct AssemblyAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AssemblyAiProvider {
    pub fn new(api_key: String, endpoint: Option<String>) -> Self {
        let base_url = endpoint.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        info!("Initialized transcription provider with base URL: {}", base_url);
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl TranscriptionProvider for AssemblyAiProvider {
    async fn submit(
        &self,
        audio_url: &str,
        language: &str,
        speaker_labels: bool,
    ) -> Result<String> {
        let transcript_url = format!("{}/transcript", self.base_url);

        let language_code = if language.is_empty() || language == "auto" {
            None
        } else {
            Some(language.to_string())
        };

        let request_body = TranscriptRequest {
            audio_url: audio_url.to_string(),
            language_code,
            speaker_labels,
        };

        debug!("Submitting transcription request");

        let response = self
            .client
            .post(&transcript_url)
            .header("Authorization", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .context("Failed to submit transcription request")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read transcription response body")?;

        if !status.is_success() {
            error!(
                "Transcription request failed with status {}: {}",
                status, response_text
            );

            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&response_text) {
                return Err(anyhow::anyhow!(
                    "Transcription API error: {}",
                    error_response.error
                ));
            }

            return Err(anyhow::anyhow!(
                "Transcription request failed with status {}: {}",
                status,
                response_text
            ));
        }

        let transcript_response: TranscriptResponse = serde_json::from_str(&response_text)
            .context("Failed to parse transcription response")?;

        debug!(
            "Transcription submitted with ID: {}",
            transcript_response.id
        );
        Ok(transcript_response.id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll> {
        let poll_url = format!("{}/transcript/{}", self.base_url, job_id);

        let response = self
            .client
            .get(&poll_url)
            .header("Authorization", &self.api_key)
            .send()
            .await
            .context("Failed to poll transcription status")?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .context("Failed to read poll response body")?;

        if !status.is_success() {
            error!(
                "Transcription poll failed with status {}: {}",
                status, response_text
            );
            return Err(anyhow::anyhow!(
                "Transcription poll failed with status {}: {}",
                status,
                response_text
            ));
        }

        let raw: serde_json::Value =
            serde_json::from_str(&response_text).context("Failed to parse poll response")?;
        let transcript_response: TranscriptResponse = serde_json::from_value(raw.clone())
            .context("Failed to parse poll response fields")?;

        Ok(JobPoll {
            status: transcript_response.status,
            text: transcript_response.text,
            words: transcript_response.words.unwrap_or_default(),
            utterances: transcript_response.utterances,
            error: transcript_response.error,
            raw,
        })
    }
}
