use std::path::Path;

use reqwest::Response;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Stream an HTTP response body into `dest`, writing in `chunk_bytes` blocks.
///
/// Parent directories are created. An existing file is truncated, so writing
/// the same body twice leaves identical bytes. A partially written file is
/// left in place on error. Returns the number of bytes written.
pub async fn write_response(
    mut response: Response,
    dest: &Path,
    chunk_bytes: usize,
) -> Result<u64, StorageError> {
    ensure_parent(dest).await?;

    let file = File::create(dest)
        .await
        .map_err(|e| StorageError::io(dest, e))?;
    let mut writer = BufWriter::with_capacity(chunk_bytes, file);
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| StorageError::io(dest, e))?;
        written += chunk.len() as u64;
    }

    writer.flush().await.map_err(|e| StorageError::io(dest, e))?;
    writer
        .into_inner()
        .sync_all()
        .await
        .map_err(|e| StorageError::io(dest, e))?;

    Ok(written)
}

/// Create the parent directory of `path` if it has one.
pub async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e)),
        _ => Ok(()),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Response body interrupted: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
