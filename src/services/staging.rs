use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("upload is empty")]
    Empty,

    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-request temporary file holding an upload. The handle is closed and
/// the file deleted when the value is dropped, on every exit path.
#[derive(Debug)]
pub struct StagedFile {
    // Field order matters: the handle closes before the path is removed.
    file: File,
    path: TempPath,
}

impl StagedFile {
    /// Creates a uniquely named file in `dir`.
    pub fn create_in(dir: &Path, prefix: &str, suffix: &str) -> Result<Self, StagingError> {
        let named = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(dir)?;
        let (file, path) = named.into_parts();
        Ok(Self {
            file: File::from_std(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies `reader` into the file, failing once more than `limit` bytes
    /// arrive. Returns the number of bytes written.
    pub async fn fill_from<R>(&mut self, reader: R, limit: u64) -> Result<u64, StagingError>
    where
        R: AsyncRead + Unpin,
    {
        let mut limited = reader.take(limit.saturating_add(1));
        let written = tokio::io::copy(&mut limited, &mut self.file).await?;
        if written > limit {
            return Err(StagingError::TooLarge { limit });
        }
        if written == 0 {
            return Err(StagingError::Empty);
        }
        self.file.flush().await?;
        Ok(written)
    }

    /// Seeks back to the first byte.
    pub async fn rewind(&mut self) -> Result<(), StagingError> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Closes the handle and atomically moves the file to `dest`.
    pub async fn persist(self, dest: &Path) -> Result<PathBuf, StagingError> {
        let Self { mut file, path } = self;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        path.persist(dest).map_err(|e| StagingError::Io(e.error))?;
        Ok(dest.to_path_buf())
    }

    /// Closes the handle and deletes the file, reporting deletion errors.
    pub fn close(self) -> std::io::Result<()> {
        let Self { file, path } = self;
        drop(file);
        path.close()
    }
}
