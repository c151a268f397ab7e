//! Append-only transcript sink

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{RelayError, Result};

use super::path::transcript_path;

/// Append-only byte sink bound to one session transcript.
///
/// Opened at relay construction and closed exactly once at teardown.
/// Chunk boundaries are not preserved on disk; only the byte sequence is.
#[derive(Debug)]
pub struct RecordingSink {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl RecordingSink {
    /// Open (or create) the transcript for `session_id` under `dir`.
    ///
    /// The directory is created if missing. Any failure is a construction error.
    pub async fn open(dir: &Path, session_id: &str) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .map_err(|source| RelayError::Construction {
                path: dir.to_path_buf(),
                source,
            })?;

        let path = transcript_path(dir, session_id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| RelayError::Construction {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %path.display(), "Transcript opened");

        Ok(Self {
            path,
            file: Some(file),
            bytes_written: 0,
        })
    }

    /// Transcript location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the sink is still open
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append a chunk and flush it to the file
    pub async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            RelayError::Recording(io::Error::new(
                io::ErrorKind::NotConnected,
                "transcript already closed",
            ))
        })?;

        file.write_all(chunk).await.map_err(RelayError::Recording)?;
        file.flush().await.map_err(RelayError::Recording)?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and close the transcript. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };

        file.flush().await.map_err(RelayError::Recording)?;
        file.sync_all().await.map_err(RelayError::Recording)?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = self.bytes_written,
            "Transcript closed"
        );
        Ok(())
    }
}
