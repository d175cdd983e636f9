//! Destinations for downloaded blob bytes

use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Byte sink for a single blob download.
///
/// The blob service calls `open` once, `write` for every chunk and `close` on
/// every exit path, including failures.
#[async_trait]
pub trait BlobSink: Send {
    async fn open(&mut self) -> Result<()>;

    async fn write(&mut self, chunk: &[u8]) -> Result<()>;

    async fn close(&mut self) -> Result<()>;

    /// Where the bytes ended up, reported back in the blob result
    fn locator(&self) -> String;
}

/// Writes a blob to a file, truncating anything already there
#[derive(Debug)]
pub struct FileBlobSink {
    path: PathBuf,
    file: Option<File>,
}

impl FileBlobSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlobSink for FileBlobSink {
    async fn open(&mut self) -> Result<()> {
        let file = File::create(&self.path).await.map_err(|e| {
            RegistryError::Io(format!("Failed to create {}: {}", self.path.display(), e))
        })?;
        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            RegistryError::Io(format!("Sink for {} is not open", self.path.display()))
        })?;
        file.write_all(chunk).await.map_err(|e| {
            RegistryError::Io(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await.map_err(|e| {
                RegistryError::Io(format!("Failed to flush {}: {}", self.path.display(), e))
            })?;
        }
        Ok(())
    }

    fn locator(&self) -> String {
        self.path.display().to_string()
    }
}
