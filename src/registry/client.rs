//! Registry client bound to a single endpoint
//!
//! [`RegistryClient`] wires one transport, executor, token cache and auth
//! service into the manifest, blob and repository operations and always
//! requests pull scope. Build it with [`RegistryClientBuilder`].

use crate::config::{PullerConfig, RegistryEndpoint};
use crate::error::Result;
use crate::image::{Digest, Manifest, TagList};
use crate::logging::Logger;
use crate::registry::auth::AuthService;
use crate::registry::executor::HttpExecutor;
use crate::registry::operations::{
    BlobOperations, BlobRequest, BlobResult, ManifestOperations, ManifestResult,
    RepositoryOperations, pull_scope,
};
use crate::registry::sink::BlobSink;
use crate::registry::token_cache::TokenCache;
use crate::registry::transport::{HttpTransport, ReqwestTransport};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// The registry reads the dispatcher depends on
#[async_trait]
pub trait RegistryApi: Send + Sync {
    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<ManifestResult>;

    async fn fetch_blob_to_path(&self, request: &BlobRequest, path: &Path) -> Result<BlobResult>;
}

pub struct RegistryClientBuilder {
    endpoint: RegistryEndpoint,
    config: PullerConfig,
    output: Logger,
    transport: Option<Arc<dyn HttpTransport>>,
    token_cache: Option<Arc<TokenCache>>,
}

impl RegistryClientBuilder {
    pub fn new(endpoint: RegistryEndpoint) -> Self {
        Self {
            endpoint,
            config: PullerConfig::default(),
            output: Logger::default(),
            transport: None,
            token_cache: None,
        }
    }

    pub fn with_config(mut self, config: PullerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    /// Replace the reqwest transport, e.g. with a proxy-aware or scripted one
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a token cache between clients
    pub fn with_token_cache(mut self, token_cache: Arc<TokenCache>) -> Self {
        self.token_cache = Some(token_cache);
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.endpoint.validate()?;
        self.config.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config.http)?) as Arc<dyn HttpTransport>,
        };
        let token_cache = self.token_cache.unwrap_or_default();
        let executor = HttpExecutor::new(transport, self.config.http.clone(), self.output.clone());
        let auth = AuthService::new(
            executor.clone(),
            token_cache.clone(),
            self.config.auth.clone(),
            self.output.clone(),
        );

        self.output.verbose(&format!(
            "Registry client ready for {}",
            self.endpoint.base_url()
        ));

        Ok(RegistryClient {
            manifests: ManifestOperations::new(executor.clone(), auth.clone(), self.output.clone()),
            blobs: BlobOperations::new(
                executor.clone(),
                auth.clone(),
                self.config.range.clone(),
                self.output.clone(),
            ),
            repositories: RepositoryOperations::new(executor, auth, self.output.clone()),
            endpoint: self.endpoint,
            token_cache,
            output: self.output,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    endpoint: RegistryEndpoint,
    manifests: ManifestOperations,
    blobs: BlobOperations,
    repositories: RepositoryOperations,
    token_cache: Arc<TokenCache>,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(endpoint: RegistryEndpoint) -> RegistryClientBuilder {
        RegistryClientBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &RegistryEndpoint {
        &self.endpoint
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    pub async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<ManifestResult> {
        self.manifests
            .fetch_manifest(&self.endpoint, repository, reference, &pull_scope(repository))
            .await
    }

    pub async fn head_manifest(
        &self,
        repository: &str,
        reference: &str,
    ) -> Result<Option<ManifestResult>> {
        self.manifests
            .head_manifest(&self.endpoint, repository, reference, &pull_scope(repository))
            .await
    }

    /// Download the config blob a manifest points at
    pub async fn fetch_config(
        &self,
        repository: &str,
        manifest: &Manifest,
        path: &Path,
    ) -> Result<BlobResult> {
        let request = BlobRequest::new(repository, manifest.config.digest.clone())
            .with_expected_size(manifest.config.size)
            .with_media_type(manifest.config.media_type.clone());
        self.output
            .detail(&format!("Fetching config {}", manifest.config.digest.short()));
        self.fetch_blob_to_path(&request, path).await
    }

    pub async fn fetch_blob(&self, request: &BlobRequest, sink: &mut dyn BlobSink) -> Result<BlobResult> {
        self.blobs
            .fetch_blob(&self.endpoint, request, sink, &pull_scope(&request.repository))
            .await
    }

    pub async fn fetch_blob_to_path(&self, request: &BlobRequest, path: &Path) -> Result<BlobResult> {
        self.blobs
            .fetch_blob_to_path(&self.endpoint, request, path, &pull_scope(&request.repository))
            .await
    }

    pub async fn head_blob(&self, repository: &str, digest: &Digest) -> Result<Option<u64>> {
        self.blobs
            .head_blob(&self.endpoint, repository, digest, &pull_scope(repository))
            .await
    }

    pub async fn list_tags(
        &self,
        repository: &str,
        n: Option<u32>,
        last: Option<&str>,
    ) -> Result<TagList> {
        self.repositories
            .list_tags(&self.endpoint, repository, n, last, &pull_scope(repository))
            .await
    }
}

#[async_trait]
impl RegistryApi for RegistryClient {
    async fn fetch_manifest(&self, repository: &str, reference: &str) -> Result<ManifestResult> {
        RegistryClient::fetch_manifest(self, repository, reference).await
    }

    async fn fetch_blob_to_path(&self, request: &BlobRequest, path: &Path) -> Result<BlobResult> {
        RegistryClient::fetch_blob_to_path(self, request, path).await
    }
}
