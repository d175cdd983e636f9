//! Fetch-then-import flow
//!
//! [`ImageImportFacade`] downloads an image through the dispatcher, checks
//! that every blob landed on disk, has the blobs assembled into an archive
//! and hands that archive to a container runtime. Assembly and runtime
//! import are collaborators supplied by the caller.

use super::{FetchResult, ImageFetchResult, ImageRef, RequestDispatcher};
use crate::error::{DispatcherErrorKind, RegistryError, Result};
use crate::logging::Logger;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Container runtime able to import an image archive
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// e.g. "docker", "podman"
    fn runtime_id(&self) -> &str;

    fn supports(&self, runtime_id: &str) -> bool {
        self.runtime_id().eq_ignore_ascii_case(runtime_id)
    }

    async fn import_image(&self, image_path: &Path) -> Result<()>;
}

/// Builds an importable archive from fetched blobs
#[async_trait]
pub trait ArchiveAssembler: Send + Sync {
    async fn assemble(&self, image: &ImageFetchResult) -> Result<PathBuf>;
}

/// Result of a successful fetch and import
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub fetched: ImageFetchResult,
    pub archive: PathBuf,
    pub runtime_id: String,
}

pub struct ImageImportFacade {
    dispatcher: Arc<RequestDispatcher>,
    output: Logger,
}

impl ImageImportFacade {
    pub fn new(dispatcher: Arc<RequestDispatcher>, output: Logger) -> Self {
        Self { dispatcher, output }
    }

    pub async fn fetch_and_load(
        &self,
        image: &ImageRef,
        assembler: &dyn ArchiveAssembler,
        runtime: &dyn RuntimeAdapter,
    ) -> Result<LoadedImage> {
        let fetched = self.dispatcher.fetch_image(image).await?;
        for blob in fetched.blobs() {
            validate_fetch_result(blob).await?;
        }

        let archive = assembler.assemble(&fetched).await.map_err(|e| {
            RegistryError::dispatcher(
                DispatcherErrorKind::Assembly,
                format!("Failed to assemble archive for {}: {}", image, e),
            )
        })?;
        validate_path(&archive).await?;

        self.output.info(&format!(
            "Importing {} ({}) into runtime {}",
            image,
            fetched.manifest.digest.short(),
            runtime.runtime_id()
        ));
        runtime.import_image(&archive).await.map_err(|e| {
            RegistryError::dispatcher(
                DispatcherErrorKind::RuntimeImport,
                format!("Failed to import image into runtime {}: {}", runtime.runtime_id(), e),
            )
        })?;
        self.output
            .success(&format!("Imported {} into {}", image, runtime.runtime_id()));

        Ok(LoadedImage {
            fetched,
            archive,
            runtime_id: runtime.runtime_id().to_string(),
        })
    }
}

/// A fetch result must name its media type and point at a non-empty regular file
pub async fn validate_fetch_result(result: &FetchResult) -> Result<()> {
    if result.media_type.trim().is_empty() {
        return Err(RegistryError::dispatcher(
            DispatcherErrorKind::MissingField,
            format!("Missing media type for {}", result.digest),
        ));
    }
    validate_path(&result.path).await
}

async fn validate_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(RegistryError::dispatcher(
            DispatcherErrorKind::MissingField,
            "Missing path in dispatcher result",
        ));
    }
    let metadata = tokio::fs::metadata(path).await.map_err(|_| {
        RegistryError::dispatcher(
            DispatcherErrorKind::PathMissing,
            format!("Fetched path does not exist: {}", path.display()),
        )
    })?;
    if !metadata.is_file() {
        return Err(RegistryError::dispatcher(
            DispatcherErrorKind::NotAFile,
            format!("Fetched path is not a regular file: {}", path.display()),
        ));
    }
    if metadata.len() == 0 {
        return Err(RegistryError::dispatcher(
            DispatcherErrorKind::EmptyFile,
            format!("Fetched file is empty: {}", path.display()),
        ));
    }
    Ok(())
}
