//! Registry read operations
//!
//! Each operation group owns an executor and the auth service and takes the
//! target endpoint per call. [`crate::registry::RegistryClient`] binds them to
//! one endpoint.

pub mod blob_operations;
pub mod manifest_operations;
pub mod repository_operations;

pub use blob_operations::BlobOperations;
pub use manifest_operations::ManifestOperations;
pub use repository_operations::RepositoryOperations;

use crate::config::RegistryEndpoint;
use crate::error::{RegistryError, Result, ValidationErrorKind};
use crate::image::{Digest, Manifest};
use crate::registry::auth::AuthService;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

/// Outcome of a manifest GET or HEAD
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestResult {
    pub digest: Digest,
    pub media_type: String,
    pub content_length: u64,
    /// Parsed manifest; `None` for HEAD probes
    pub manifest: Option<Manifest>,
}

/// Inclusive byte range; an open end means "to the end of the blob"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end < start {
            return Err(RegistryError::Config(format!(
                "Invalid byte range {}-{}: end before start",
                start, end
            )));
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    pub fn from_offset(start: u64) -> Self {
        Self { start, end: None }
    }

    /// `Range` header value
    pub fn header_value(&self) -> String {
        match self.end {
            Some(end) => format!("bytes={}-{}", self.start, end),
            None => format!("bytes={}-", self.start),
        }
    }
}

/// A blob to download
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRequest {
    pub repository: String,
    pub digest: Digest,
    pub expected_size: Option<u64>,
    pub media_type: Option<String>,
    pub range: Option<ByteRange>,
}

impl BlobRequest {
    pub fn new(repository: impl Into<String>, digest: Digest) -> Self {
        Self {
            repository: repository.into(),
            digest,
            expected_size: None,
            media_type: None,
            range: None,
        }
    }

    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// A completed blob download
#[derive(Debug, Clone, PartialEq)]
pub struct BlobResult {
    pub digest: Digest,
    pub size: u64,
    pub media_type: String,
    pub locator: String,
    /// The registry answered with a byte range rather than the whole blob
    pub partial: bool,
}

pub fn manifest_path(repository: &str, reference: &str) -> String {
    format!("/v2/{}/manifests/{}", repository, reference)
}

pub fn blob_path(repository: &str, digest: &Digest) -> String {
    format!("/v2/{}/blobs/{}", repository, digest)
}

pub fn tags_path(repository: &str) -> String {
    format!("/v2/{}/tags/list", repository)
}

/// Default pull scope for a repository
pub fn pull_scope(repository: &str) -> String {
    format!("repository:{}:pull", repository)
}

/// Reject repository names that cannot form a registry path
pub fn validate_repository(repository: &str) -> Result<()> {
    let valid = !repository.is_empty()
        && !repository.starts_with('/')
        && !repository.ends_with('/')
        && !repository.contains("//")
        && repository.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
        });
    if valid {
        Ok(())
    } else {
        Err(RegistryError::validation(
            ValidationErrorKind::InvalidReference,
            format!("Invalid repository name: '{}'", repository),
        ))
    }
}

/// Headers for a registry request, with `Authorization` when the registry wants a token
pub(crate) async fn authorized_headers(
    auth: &AuthService,
    endpoint: &RegistryEndpoint,
    repository: &str,
    scope: &str,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(value) = auth.get_auth_header(endpoint, repository, scope).await? {
        let value = HeaderValue::from_str(&value).map_err(|_| {
            RegistryError::Parse("Token contains characters not allowed in a header".to_string())
        })?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}
