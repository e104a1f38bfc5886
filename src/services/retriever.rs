use std::path::Path;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use strum::{Display, EnumString};

use super::simulation::{ServiceError, SimulationService};
use super::storage::{self, StorageError};
use crate::models::job::{Recording, StreamRef};
use crate::models::media::{MediaAsset, MediaKind};

/// Write size for streamed downloads (256 KiB).
pub const DEFAULT_CHUNK_BYTES: usize = 256 * 1024;

/// Which streams of a completed job to retrieve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Deserialize)]
#[serde(try_from = "String")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StreamSelection {
    #[default]
    First,
    All,
}

impl TryFrom<String> for StreamSelection {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .parse()
            .map_err(|_| format!("unknown stream selection `{value}`, expected `first` or `all`"))
    }
}

impl StreamSelection {
    pub fn pick<'a>(&self, streams: &'a [StreamRef]) -> &'a [StreamRef] {
        match self {
            StreamSelection::First => &streams[..streams.len().min(1)],
            StreamSelection::All => streams,
        }
    }
}

/// Resolves stream references to recordings and downloads them.
pub struct AssetRetriever {
    http: Client,
    chunk_bytes: usize,
}

impl AssetRetriever {
    pub fn new(http: Client, chunk_bytes: usize) -> Self {
        Self {
            http,
            chunk_bytes: chunk_bytes.max(1),
        }
    }

    /// Ask the service for the recording behind every selected stream, in order.
    pub async fn resolve(
        &self,
        service: &dyn SimulationService,
        streams: &[StreamRef],
        selection: StreamSelection,
    ) -> Result<Vec<(StreamRef, Recording)>, ServiceError> {
        let mut resolved = Vec::new();
        for stream in selection.pick(streams) {
            let recording = service.fetch_recording(&stream.stream_id).await?;
            tracing::info!(
                stream_id = %stream.stream_id,
                video_url = %recording.video_url,
                "Recording resolved"
            );
            resolved.push((stream.clone(), recording));
        }
        Ok(resolved)
    }

    /// Stream `url` to `dest`. Non-2xx responses are fatal and write nothing.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<MediaAsset, DownloadError> {
        tracing::info!(url = %url, path = %dest.display(), "Downloading video");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| DownloadError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = storage::write_response(response, dest, self.chunk_bytes).await?;
        metrics::counter!("asset_download_bytes_total").increment(bytes);
        tracing::info!(path = %dest.display(), bytes, "Video saved");

        Ok(MediaAsset {
            kind: MediaKind::Video,
            path: dest.to_path_buf(),
            bytes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Download of {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download of {url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
