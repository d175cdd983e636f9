//! Request dispatcher
//!
//! Sources every blob through the fallback chain local cache, then peers,
//! then the registry. Registry downloads are bounded by a semaphore and
//! published back to the cache and to peers once they complete.

pub mod import;

use crate::cache::{CacheAdapter, CachePayload};
use crate::config::DispatcherConfig;
use crate::error::{RegistryError, Result, ValidationErrorKind};
use crate::image::{Digest, Descriptor};
use crate::logging::Logger;
use crate::p2p::{NoOpP2P, P2PExecutor};
use crate::registry::client::RegistryApi;
use crate::registry::operations::{BlobRequest, ManifestResult, validate_repository};
use futures::future::try_join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use uuid::Uuid;

pub use import::{ArchiveAssembler, ImageImportFacade, RuntimeAdapter};

const DEFAULT_TAG: &str = "latest";

/// Where a fetched blob came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    P2P,
    Registry,
}

impl fmt::Display for FetchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchSource::Cache => f.write_str("cache"),
            FetchSource::P2P => f.write_str("p2p"),
            FetchSource::Registry => f.write_str("registry"),
        }
    }
}

/// A blob available on local disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub digest: Digest,
    pub media_type: String,
    pub path: PathBuf,
    pub source: FetchSource,
}

/// Repository plus tag and/or digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<Digest>,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: Option<String>, digest: Option<Digest>) -> Result<Self> {
        let repository = repository.into();
        validate_repository(&repository)?;
        let tag = tag.filter(|t| !t.trim().is_empty());
        if tag.is_none() && digest.is_none() {
            return Err(RegistryError::validation(
                ValidationErrorKind::InvalidReference,
                format!("Image {} needs a tag or a digest", repository),
            ));
        }
        Ok(Self {
            repository,
            tag,
            digest,
        })
    }

    /// Parse `repo`, `repo:tag`, `repo@sha256:...` or `repo:tag@sha256:...`
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let (name, digest) = match value.split_once('@') {
            Some((name, digest)) => (name, Some(Digest::parse(digest)?)),
            None => (value, None),
        };

        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&name[..split], Some(name[split + 1..].to_string()))
            }
            None => (name, None),
        };

        let tag = match (tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            (tag, _) => tag,
        };
        Self::new(repository, tag, digest)
    }

    /// Manifest reference: the digest when pinned, the tag otherwise
    pub fn reference(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => DEFAULT_TAG.to_string(),
        }
    }
}

impl FromStr for ImageRef {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        ImageRef::parse(s)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Every blob of one image, in manifest order
#[derive(Debug, Clone)]
pub struct ImageFetchResult {
    pub image: ImageRef,
    pub manifest: ManifestResult,
    pub config: FetchResult,
    pub layers: Vec<FetchResult>,
    /// Wall time of this fetch, manifest included
    pub elapsed: Duration,
}

impl ImageFetchResult {
    /// Config followed by layers
    pub fn blobs(&self) -> impl Iterator<Item = &FetchResult> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }
}

/// Removes a partially downloaded file unless the download is kept
struct TempBlob {
    path: PathBuf,
    keep: bool,
}

impl TempBlob {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for TempBlob {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Counts registry downloads holding a permit
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RequestDispatcher {
    registry: Arc<dyn RegistryApi>,
    cache: Option<Arc<dyn CacheAdapter>>,
    p2p: Arc<dyn P2PExecutor>,
    limiter: Option<Semaphore>,
    closed: AtomicBool,
    in_flight: AtomicUsize,
    config: DispatcherConfig,
    output: Logger,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<dyn RegistryApi>, config: DispatcherConfig, output: Logger) -> Self {
        let limiter = config.registry_limit().map(Semaphore::new);
        Self {
            registry,
            cache: None,
            p2p: Arc::new(NoOpP2P),
            limiter,
            closed: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            config,
            output,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheAdapter>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_p2p(mut self, p2p: Arc<dyn P2PExecutor>) -> Self {
        self.p2p = p2p;
        self
    }

    /// Registry downloads currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Stop accepting registry downloads; waiting and later callers get `Cancelled`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(limiter) = &self.limiter {
            limiter.close();
        }
        self.output.verbose("Request dispatcher closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Obtain one blob on local disk: cache, then peers, then the registry
    pub async fn fetch_layer(
        &self,
        repository: &str,
        digest: &Digest,
        size: u64,
        media_type: &str,
    ) -> Result<FetchResult> {
        if let Some(result) = self.try_cache(digest, media_type).await {
            return Ok(result);
        }
        if let Some(result) = self.try_p2p(digest, size, media_type).await {
            return Ok(result);
        }
        self.fetch_from_registry(repository, digest, size, media_type)
            .await
    }

    /// Fetch the manifest of an image and every blob it references
    pub async fn fetch_image(&self, image: &ImageRef) -> Result<ImageFetchResult> {
        let started = Instant::now();
        let manifest_result = self
            .registry
            .fetch_manifest(&image.repository, &image.reference())
            .await?;
        let manifest = manifest_result.manifest.as_ref().ok_or_else(|| {
            RegistryError::Parse(format!("Manifest for {} has no body", image))
        })?;

        self.output.info(&format!(
            "Fetching {} ({} layers, {})",
            image,
            manifest.layers.len(),
            self.output.format_size(manifest.total_size())
        ));

        let config_fetch = self.fetch_descriptor(&image.repository, &manifest.config);
        let layer_fetches = manifest
            .layers
            .iter()
            .map(|layer| self.fetch_descriptor(&image.repository, layer));
        let (config, layers) = futures::try_join!(config_fetch, try_join_all(layer_fetches))?;

        let elapsed = started.elapsed();
        self.output.success(&format!(
            "Fetched {} in {}",
            image,
            self.output.format_duration(elapsed)
        ));
        Ok(ImageFetchResult {
            image: image.clone(),
            manifest: manifest_result.clone(),
            config,
            layers,
            elapsed,
        })
    }

    async fn fetch_descriptor(&self, repository: &str, descriptor: &Descriptor) -> Result<FetchResult> {
        self.fetch_layer(
            repository,
            &descriptor.digest,
            descriptor.size,
            &descriptor.media_type,
        )
        .await
    }

    async fn try_cache(&self, digest: &Digest, media_type: &str) -> Option<FetchResult> {
        let cache = self.cache.as_ref()?;
        let lookup = async {
            if !cache.has(digest).await? {
                return Ok(None);
            }
            let Some(entry) = cache.get(digest).await? else {
                return Ok(None);
            };
            let path = cache.resolve(&entry.key).await?;
            Ok::<_, RegistryError>(path.map(|path| (entry, path)))
        };

        match lookup.await {
            Ok(Some((entry, path))) => {
                self.output
                    .verbose(&format!("Cache hit for layer {}", digest.short()));
                let media_type = if entry.media_type.is_empty() {
                    media_type.to_string()
                } else {
                    entry.media_type
                };
                Some(FetchResult {
                    digest: digest.clone(),
                    media_type,
                    path,
                    source: FetchSource::Cache,
                })
            }
            Ok(None) => None,
            Err(err) => {
                self.output
                    .warning(&format!("Cache lookup failed for layer {}: {}", digest.short(), err));
                None
            }
        }
    }

    async fn try_p2p(&self, digest: &Digest, size: u64, media_type: &str) -> Option<FetchResult> {
        match self.p2p.fetch(digest, size, media_type).await {
            Ok(Some(path)) => {
                self.output.verbose(&format!("P2P hit for layer {}", digest.short()));
                Some(FetchResult {
                    digest: digest.clone(),
                    media_type: media_type.to_string(),
                    path,
                    source: FetchSource::P2P,
                })
            }
            Ok(None) => None,
            Err(err) => {
                self.output
                    .warning(&format!("P2P fetch failed for layer {}: {}", digest.short(), err));
                None
            }
        }
    }

    async fn acquire_registry(&self) -> Result<Option<SemaphorePermit<'_>>> {
        let closed = || RegistryError::Cancelled("Request dispatcher is closed".to_string());
        if self.is_closed() {
            return Err(closed());
        }
        match &self.limiter {
            Some(limiter) => limiter.acquire().await.map(Some).map_err(|_| closed()),
            None => Ok(None),
        }
    }

    async fn fetch_from_registry(
        &self,
        repository: &str,
        digest: &Digest,
        size: u64,
        media_type: &str,
    ) -> Result<FetchResult> {
        let temp_dir = self.config.resolved_temp_dir();
        let permit = self.acquire_registry().await?;
        let in_flight = InFlight::enter(&self.in_flight);

        tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| {
            RegistryError::Io(format!("Cannot create temp dir {}: {}", temp_dir.display(), e))
        })?;
        let temp = TempBlob::new(temp_dir.join(format!("layer-{}.bin", Uuid::new_v4())));

        let request = BlobRequest::new(repository, digest.clone())
            .with_expected_size(size)
            .with_media_type(media_type);
        self.output.detail(&format!(
            "Downloading layer {} from registry ({})",
            digest.short(),
            self.output.format_size(size)
        ));
        let blob = self.registry.fetch_blob_to_path(&request, &temp.path).await?;
        let path = temp.keep();
        drop(in_flight);
        drop(permit);
        self.output
            .verbose(&format!("Downloaded layer {} from registry", digest.short()));

        self.publish(&blob.digest, &path, blob.size, &blob.media_type).await;

        Ok(FetchResult {
            digest: blob.digest,
            media_type: blob.media_type,
            path,
            source: FetchSource::Registry,
        })
    }

    /// Best-effort publish-back; failures are logged and swallowed
    async fn publish(&self, digest: &Digest, path: &Path, size: u64, media_type: &str) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache
                .put(digest, CachePayload::new(path, size), media_type)
                .await
            {
                self.output
                    .warning(&format!("Failed to put layer {} to cache: {}", digest.short(), err));
            }
        }
        if let Err(err) = self.p2p.publish(digest, path, size, media_type).await {
            self.output
                .warning(&format!("P2P publish failed for {}: {}", digest.short(), err));
        }
    }
}
