use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use super::storage::{self, StorageError};

/// Combines a video file and an audio file into one container.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Copy the video stream, re-encode the audio, stop at the shorter input.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Could not read duration of {path}: {reason}")]
    Probe { path: String, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 8;

/// `ffmpeg` / `ffprobe` subprocess muxer.
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Arguments for the mux invocation.
    pub fn mux_args(video: &Path, audio: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = Vec::new();
        args.push("-y".into());
        args.push("-i".into());
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        for flag in ["-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-shortest"] {
            args.push(flag.into());
        }
        args.push(output.into());
        args
    }

    /// Container duration in seconds, as reported by ffprobe.
    pub async fn probe_duration(&self, path: &Path) -> Result<f64, MuxError> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "csv=p=0"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| MuxError::Spawn {
                program: self.ffprobe.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(MuxError::Exit {
                program: self.ffprobe.display().to_string(),
                status: output.status,
                stderr: stderr_tail(&output.stderr),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim().parse::<f64>().map_err(|e| MuxError::Probe {
            path: path.display().to_string(),
            reason: format!("{e} (ffprobe printed `{}`)", text.trim()),
        })
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
        storage::ensure_parent(output).await?;

        tracing::info!(
            video = %video.display(),
            audio = %audio.display(),
            output = %output.display(),
            "Muxing audio and video"
        );

        let result = Command::new(&self.ffmpeg)
            .args(Self::mux_args(video, audio, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| MuxError::Spawn {
                program: self.ffmpeg.display().to_string(),
                source,
            })?;

        if !result.status.success() {
            return Err(MuxError::Exit {
                program: self.ffmpeg.display().to_string(),
                status: result.status,
                stderr: stderr_tail(&result.stderr),
            });
        }

        tracing::info!(output = %output.display(), "Final video written");
        Ok(())
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
