use std::path::PathBuf;
use std::time::Duration;

use garde::Validate;
use serde::Deserialize;

use crate::models::media::OutputLayout;
use crate::services::narration::SpeechSettings;
use crate::services::poller::PollPolicy;
use crate::services::retriever::{StreamSelection, DEFAULT_CHUNK_BYTES};
use crate::services::simulation::DEFAULT_REQUEST_TIMEOUT;

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Simulation service API key (required)
    #[garde(length(min = 1))]
    pub odyssey_api_key: String,

    /// Text-to-speech API key (required)
    #[garde(length(min = 1))]
    pub openai_api_key: String,

    #[serde(default = "default_odyssey_base_url")]
    #[garde(length(min = 1))]
    pub odyssey_base_url: String,

    #[serde(default = "default_openai_base_url")]
    #[garde(length(min = 1))]
    pub openai_base_url: String,

    /// Directory receiving the raw video, narration and final video
    #[serde(default = "default_output_dir")]
    #[garde(skip)]
    pub render_output_dir: PathBuf,

    /// Seconds to sleep between status queries
    #[serde(default = "default_poll_interval_secs")]
    #[garde(range(min = 1))]
    pub render_poll_interval_secs: u64,

    /// Give up after this many status queries. Unset means no limit.
    #[serde(default)]
    #[garde(range(min = 1))]
    pub render_poll_max_attempts: Option<u32>,

    /// Give up after waiting this long for the job. Unset means no limit.
    #[serde(default)]
    #[garde(range(min = 1))]
    pub render_poll_timeout_secs: Option<u64>,

    /// Upper bound for one simulation API round trip
    #[serde(default = "default_request_timeout_secs")]
    #[garde(range(min = 1))]
    pub render_request_timeout_secs: u64,

    /// `first` or `all`
    #[serde(default)]
    #[garde(skip)]
    pub render_streams: StreamSelection,

    #[serde(default = "default_chunk_bytes")]
    #[garde(range(min = 1024))]
    pub render_download_chunk_bytes: usize,

    #[serde(default = "default_tts_voice")]
    #[garde(length(min = 1))]
    pub tts_voice: String,

    #[serde(default = "default_tts_model")]
    #[garde(length(min = 1))]
    pub tts_model: String,

    #[serde(default = "default_tts_instructions")]
    #[garde(skip)]
    pub tts_instructions: String,

    #[serde(default = "default_ffmpeg_path")]
    #[garde(length(min = 1))]
    pub ffmpeg_path: String,

    #[serde(default = "default_ffprobe_path")]
    #[garde(length(min = 1))]
    pub ffprobe_path: String,
}

fn default_odyssey_base_url() -> String {
    "https://api.odyssey.world".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_chunk_bytes() -> usize {
    DEFAULT_CHUNK_BYTES
}

fn default_tts_voice() -> String {
    SpeechSettings::default().voice
}

fn default_tts_model() -> String {
    SpeechSettings::default().model
}

fn default_tts_instructions() -> String {
    SpeechSettings::default().instructions
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

impl AppConfig {
    /// Load `.env` (if present) and read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Read configuration from explicit key/value pairs (keys in upper case).
    pub fn from_iter<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars).map_err(|e| match e {
            envy::Error::MissingValue(field) => ConfigError::Missing {
                var: field.to_uppercase(),
            },
            other => ConfigError::Env(other),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            poll: PollPolicy {
                interval: Duration::from_secs(self.render_poll_interval_secs),
                max_attempts: self.render_poll_max_attempts,
                deadline: self.render_poll_timeout_secs.map(Duration::from_secs),
            },
            speech: SpeechSettings {
                voice: self.tts_voice.clone(),
                model: self.tts_model.clone(),
                instructions: self.tts_instructions.clone(),
            },
            layout: OutputLayout::new(&self.render_output_dir),
            streams: self.render_streams,
            chunk_bytes: self.render_download_chunk_bytes,
        }
    }
}

/// Tunables handed to the pipeline at construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub poll: PollPolicy,
    pub speech: SpeechSettings,
    pub layout: OutputLayout,
    pub streams: StreamSelection,
    pub chunk_bytes: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            speech: SpeechSettings::default(),
            layout: OutputLayout::default(),
            streams: StreamSelection::default(),
            chunk_bytes: DEFAULT_CHUNK_BYTES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing {var}. Set it like: export {var}='...'")]
    Missing { var: String },

    #[error("Invalid environment value: {0}")]
    Env(envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
