//! Transient upload spooling.
//!
//! Each request spools its uploaded file to a uniquely named temp file in the
//! configured upload directory, and that file must be gone again by the time
//! the response is sent — on success and on every failure path. [`TempUpload`]
//! owns that lifecycle: the handler calls [`TempUpload::remove`] as its single
//! deferred cleanup, and `Drop` catches any path that skipped it (early `?`,
//! panic) with a best-effort synchronous removal.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// A uniquely named temp file holding one request's uploaded bytes.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    file: Option<File>,
    removed: bool,
}

impl TempUpload {
    /// Create a fresh spool file under `dir`.
    ///
    /// Names are uuid-based so concurrent requests never collide.
    pub async fn create(dir: &Path) -> io::Result<Self> {
        let path = dir.join(Uuid::new_v4().simple().to_string());
        let file = OpenOptions::new().write(true).create_new(true).open(&path).await?;
        Ok(Self {
            path,
            file: Some(file),
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a chunk of the incoming upload.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::other("upload already finished")),
        }
    }

    /// Flush and close the write handle. Must be called before [`read`](Self::read).
    pub async fn finish(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }

    /// Read the spooled bytes back from disk.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// Delete the temp file.
    ///
    /// Deletion failure is logged and swallowed: it must not override the
    /// request's primary result.
    pub async fn remove(mut self) {
        self.file.take();
        self.removed = true;
        if let Err(err) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove temp upload");
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        self.file.take();
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "Failed to remove temp upload on drop");
            }
        }
    }
}
