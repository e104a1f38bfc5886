use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::job::{JobId, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
}

/// A file written by one pipeline stage. Never deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Narration read over the whole video, as a single block of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrationText(String);

impl NarrationText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

/// Fixed file names inside the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Raw simulation video for the stream at `index`.
    pub fn raw_video(&self, index: usize) -> PathBuf {
        self.root.join(indexed("odyssey", index, "mp4"))
    }

    pub fn narration(&self) -> PathBuf {
        self.root.join("narration.mp3")
    }

    /// Muxed output for the stream at `index`.
    pub fn final_video(&self, index: usize) -> PathBuf {
        self.root.join(indexed("final_with_audio", index, "mp4"))
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new("outputs")
    }
}

fn indexed(stem: &str, index: usize, ext: &str) -> String {
    if index == 0 {
        format!("{stem}.{ext}")
    } else {
        format!("{stem}_{index}.{ext}")
    }
}

/// Everything one successful run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderReport {
    pub run_id: Uuid,
    pub job_id: JobId,
    pub streams: Vec<StreamId>,
    pub raw_videos: Vec<MediaAsset>,
    pub narration: MediaAsset,
    pub final_videos: Vec<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// How a run ended when no error occurred.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(RenderReport),
    /// The service cancelled the job; nothing was downloaded.
    Cancelled { job_id: JobId },
}
