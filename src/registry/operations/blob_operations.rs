//! Blob operations for registry client
//!
//! Implements Docker Registry v2 blob reads:
//! - Blob download (GET /v2/{name}/blobs/{digest}) streamed through SHA256 into a sink
//! - Optional byte ranges with a full-download fallback on 416
//! - Blob existence and size probe (HEAD /v2/{name}/blobs/{digest})

use super::{BlobRequest, BlobResult, ByteRange, authorized_headers, blob_path, validate_repository};
use crate::config::{PartialValidation, RangeConfig, RangeMode, RegistryEndpoint};
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{RegistryError, Result, ValidationErrorKind};
use crate::image::{Digest, DigestHasher, MediaType};
use crate::logging::Logger;
use crate::registry::auth::AuthService;
use crate::registry::executor::HttpExecutor;
use crate::registry::sink::{BlobSink, FileBlobSink};
use crate::registry::transport::BodyStream;
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, HeaderValue, RANGE};
use std::path::Path;

/// Parsed `Content-Range: bytes start-end/total`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: Option<u64>,
}

impl ContentRange {
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (range, total) = rest.split_once('/')?;
        let (start, end) = range.trim().split_once('-')?;
        let start: u64 = start.trim().parse().ok()?;
        let end: u64 = end.trim().parse().ok()?;
        if end < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            total => Some(total.parse().ok()?),
        };
        Some(Self { start, end, total })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether the returned bytes span the entire blob
    pub fn is_complete(&self) -> bool {
        self.start == 0 && self.total == Some(self.end + 1)
    }

    /// Whether this is the range that was asked for; an end past the blob may be clamped
    pub fn satisfies(&self, requested: &ByteRange) -> bool {
        if self.start != requested.start {
            return false;
        }
        match (requested.end, self.total) {
            (Some(end), Some(total)) => self.end == end.min(total.saturating_sub(1)),
            (Some(end), None) => self.end == end,
            (None, Some(total)) => self.end + 1 == total,
            (None, None) => true,
        }
    }
}

#[derive(Clone)]
pub struct BlobOperations {
    executor: HttpExecutor,
    auth: AuthService,
    range: RangeConfig,
    output: Logger,
}

impl BlobOperations {
    pub fn new(executor: HttpExecutor, auth: AuthService, range: RangeConfig, output: Logger) -> Self {
        Self {
            executor,
            auth,
            range,
            output,
        }
    }

    /// Download a blob into `sink`, verifying digest and size on the fly.
    ///
    /// The sink is opened for this call and closed on every exit path.
    pub async fn fetch_blob(
        &self,
        endpoint: &RegistryEndpoint,
        request: &BlobRequest,
        sink: &mut dyn BlobSink,
        scope: &str,
    ) -> Result<BlobResult> {
        validate_repository(&request.repository)?;
        let target = format!("{}@{}", request.repository, request.digest);
        let url = endpoint.url(&blob_path(&request.repository, &request.digest))?;

        let mut headers =
            authorized_headers(&self.auth, endpoint, &request.repository, scope).await?;
        let mut range = request.range.filter(|_| self.range.mode == RangeMode::Auto);
        if let Some(range) = range {
            headers.insert(RANGE, range_header(&range)?);
        }

        self.output.verbose(&format!("Downloading blob {}", target));
        let mut response = self.executor.get(&url, headers.clone()).await?;

        if response.status == 416 && range.is_some() && self.range.fallback_to_full_on_416 {
            self.output.warning(&format!(
                "Range not satisfiable for {}, retrying full download",
                target
            ));
            headers.remove(RANGE);
            range = None;
            response = self.executor.get(&url, headers).await?;
        }
        if !response.is_success() {
            return Err(HttpErrorHandler::handle_registry_error(
                response.status,
                "Blob fetch",
                &target,
            ));
        }

        let content_range = if response.status == 206 {
            let Some(range) = range else {
                return Err(RegistryError::validation(
                    ValidationErrorKind::PartialContent,
                    format!("Registry returned partial content for unranged request {}", target),
                ));
            };
            if self.range.partial_validation == PartialValidation::RequireFull {
                return Err(RegistryError::validation(
                    ValidationErrorKind::PartialContent,
                    format!("Registry returned partial content for {}", target),
                ));
            }
            let content_range = response
                .header(CONTENT_RANGE.as_str())
                .and_then(ContentRange::parse)
                .ok_or_else(|| {
                    RegistryError::validation(
                        ValidationErrorKind::MissingHeader,
                        format!("Partial response for {} has no valid Content-Range", target),
                    )
                })?;
            if !content_range.satisfies(&range) {
                return Err(RegistryError::validation(
                    ValidationErrorKind::PartialContent,
                    format!(
                        "Content-Range bytes {}-{} does not match requested {} for {}",
                        content_range.start,
                        content_range.end,
                        range.header_value(),
                        target
                    ),
                ));
            }
            if let (Some(total), Some(expected)) = (content_range.total, request.expected_size) {
                if total != expected {
                    return Err(RegistryError::validation(
                        ValidationErrorKind::SizeMismatch,
                        format!(
                            "Blob size mismatch for {}: expected {}, Content-Range total {}",
                            target, expected, total
                        ),
                    ));
                }
            }
            Some(content_range)
        } else {
            None
        };
        // A range covering the whole blob is verified like a full download
        let partial = content_range.is_some_and(|content_range| !content_range.is_complete());

        let expected_size = match content_range {
            Some(content_range) => content_range.len(),
            None => request
                .expected_size
                .or_else(|| response.content_length())
                .ok_or_else(|| {
                    RegistryError::validation(
                        ValidationErrorKind::MissingLength,
                        format!("No expected size or Content-Length for {}", target),
                    )
                })?,
        };
        let media_type = response
            .header(CONTENT_TYPE.as_str())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
            .or_else(|| request.media_type.clone())
            .unwrap_or_else(|| MediaType::OctetStream.as_str().to_string());

        let written = match sink.open().await {
            Ok(()) => write_streaming(response.into_body(), sink).await,
            Err(err) => Err(err),
        };
        let closed = sink.close().await;
        let (actual_digest, size) = match (written, closed) {
            (Ok(written), Ok(())) => written,
            (Ok(_), Err(close_err)) => return Err(close_err),
            (Err(err), Err(close_err)) => {
                self.output
                    .warning(&format!("Failed to close sink {}: {}", sink.locator(), close_err));
                return Err(err);
            }
            (Err(err), Ok(())) => return Err(err),
        };

        let digest = if partial {
            request.digest.clone()
        } else {
            if actual_digest != request.digest {
                return Err(RegistryError::validation(
                    ValidationErrorKind::DigestMismatch,
                    format!(
                        "Blob digest mismatch in {}: expected {}, actual {}",
                        request.repository, request.digest, actual_digest
                    ),
                ));
            }
            actual_digest
        };
        if size != expected_size {
            return Err(RegistryError::validation(
                ValidationErrorKind::SizeMismatch,
                format!(
                    "Blob size mismatch for {}: expected {}, actual {}",
                    target, expected_size, size
                ),
            ));
        }

        self.output.verbose(&format!(
            "Blob {} downloaded ({}{})",
            digest.short(),
            self.output.format_size(size),
            if partial { ", partial" } else { "" }
        ));
        Ok(BlobResult {
            digest,
            size,
            media_type,
            locator: sink.locator(),
            partial,
        })
    }

    /// Download a blob into a file at `path`
    pub async fn fetch_blob_to_path(
        &self,
        endpoint: &RegistryEndpoint,
        request: &BlobRequest,
        path: &Path,
        scope: &str,
    ) -> Result<BlobResult> {
        let mut sink = FileBlobSink::new(path);
        self.fetch_blob(endpoint, request, &mut sink, scope).await
    }

    /// Blob size from a HEAD probe; `None` on 404 or when no length is reported
    pub async fn head_blob(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        digest: &Digest,
        scope: &str,
    ) -> Result<Option<u64>> {
        validate_repository(repository)?;
        let target = format!("{}@{}", repository, digest);
        let headers = authorized_headers(&self.auth, endpoint, repository, scope).await?;
        let url = endpoint.url(&blob_path(repository, digest))?;
        let response = self.executor.head(&url, headers).await?;

        if response.status == 404 {
            self.output.detail(&format!("Blob {} does not exist in registry", target));
            return Ok(None);
        }
        if !response.is_success() {
            return Err(HttpErrorHandler::handle_registry_error(
                response.status,
                "Blob HEAD",
                &target,
            ));
        }
        Ok(response.content_length())
    }
}

fn range_header(range: &ByteRange) -> Result<HeaderValue> {
    HeaderValue::from_str(&range.header_value())
        .map_err(|e| RegistryError::Config(format!("Invalid Range header: {}", e)))
}

async fn write_streaming(mut body: BodyStream, sink: &mut dyn BlobSink) -> Result<(Digest, u64)> {
    let mut hasher = DigestHasher::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| NetworkErrorHandler::handle_body_error(&e, "Blob download"))?;
        hasher.update(&chunk);
        sink.write(&chunk).await?;
    }
    let size = hasher.bytes();
    Ok((hasher.finalize(), size))
}
