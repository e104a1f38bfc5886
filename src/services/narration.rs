use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::storage::{self, StorageError};
use crate::models::media::{MediaAsset, MediaKind, NarrationText};

/// Voice, model and delivery instructions for speech synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSettings {
    pub voice: String,
    pub model: String,
    pub instructions: String,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            voice: "coral".to_string(),
            model: "gpt-4o-mini-tts".to_string(),
            instructions:
                "Narrate like a warm storyteller. Clear, expressive, child-friendly pacing."
                    .to_string(),
        }
    }
}

/// Text-to-speech backend. Writes the synthesized audio to `dest`.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &NarrationText,
        settings: &SpeechSettings,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Narration text is empty")]
    EmptyText,

    #[error("Speech request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Speech API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Speech synthesis failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    instructions: &'a str,
    response_format: &'static str,
}

/// OpenAI audio speech endpoint, streamed straight to disk.
pub struct OpenAiSpeechClient {
    http: Client,
    base_url: String,
    api_key: String,
    chunk_bytes: usize,
}

impl OpenAiSpeechClient {
    pub fn new(http: Client, base_url: &str, api_key: &str, chunk_bytes: usize) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            chunk_bytes: chunk_bytes.max(1),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechClient {
    async fn synthesize(
        &self,
        text: &NarrationText,
        settings: &SpeechSettings,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        if text.is_blank() {
            return Err(SynthesisError::EmptyText);
        }

        tracing::info!(
            voice = %settings.voice,
            model = %settings.model,
            chars = text.as_str().len(),
            "Generating narration"
        );

        let response = self
            .http
            .post(format!("{}/v1/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &settings.model,
                voice: &settings.voice,
                input: text.as_str(),
                instructions: &settings.instructions,
                response_format: "mp3",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status { status, body });
        }

        let bytes = storage::write_response(response, dest, self.chunk_bytes).await?;
        metrics::counter!("narration_bytes_total").increment(bytes);
        tracing::info!(path = %dest.display(), bytes, "Narration saved");

        Ok(MediaAsset {
            kind: MediaKind::Audio,
            path: dest.to_path_buf(),
            bytes,
        })
    }
}
