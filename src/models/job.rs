use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

use super::script::Script;

/// Opaque identifier of a submitted simulation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of one output stream of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A submitted simulation request. Immutable once created.
#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: JobId,
    pub script: Script,
    pub portrait: bool,
}

/// Lifecycle state reported by the simulation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Completed, failed and cancelled jobs never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Reference to one output stream of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRef {
    pub stream_id: StreamId,
}

/// Snapshot of a job as returned by one status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub streams: Vec<StreamRef>,
}

// Pending jobs may report `"streams": null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            status: JobState::Pending,
            error_message: None,
            streams: Vec::new(),
        }
    }

    pub fn running() -> Self {
        Self {
            status: JobState::Running,
            ..Self::pending()
        }
    }

    pub fn completed(stream_ids: &[&str]) -> Self {
        Self {
            status: JobState::Completed,
            error_message: None,
            streams: stream_ids
                .iter()
                .map(|id| StreamRef {
                    stream_id: StreamId(id.to_string()),
                })
                .collect(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobState::Failed,
            error_message: Some(message.into()),
            streams: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: JobState::Cancelled,
            ..Self::pending()
        }
    }
}

/// Downloadable asset behind a stream. Only lives until the download step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub video_url: String,
}
