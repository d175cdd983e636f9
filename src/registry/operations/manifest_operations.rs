//! Manifest operations for registry client
//!
//! Implements Docker Registry v2 and OCI manifest reads:
//! - Manifest download (GET /v2/{name}/manifests/{reference}) with digest verification
//! - Manifest index / manifest list resolution to the linux/amd64 entry
//! - Existence probe (HEAD /v2/{name}/manifests/{reference})

use super::{ManifestResult, authorized_headers, manifest_path, validate_repository};
use crate::config::RegistryEndpoint;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result, ValidationErrorKind};
use crate::image::{Digest, Manifest, ManifestIndex, MediaType};
use crate::logging::Logger;
use crate::registry::auth::AuthService;
use crate::registry::executor::HttpExecutor;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};

/// Nested indices followed before giving up
pub const MAX_INDEX_DEPTH: usize = 4;

const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";
const TARGET_OS: &str = "linux";
const TARGET_ARCHITECTURE: &str = "amd64";

#[derive(Clone)]
pub struct ManifestOperations {
    executor: HttpExecutor,
    auth: AuthService,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(executor: HttpExecutor, auth: AuthService, output: Logger) -> Self {
        Self {
            executor,
            auth,
            output,
        }
    }

    /// Fetch a manifest by tag or digest, resolving indices to a single-platform manifest
    pub async fn fetch_manifest(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        reference: &str,
        scope: &str,
    ) -> Result<ManifestResult> {
        validate_repository(repository)?;

        let mut reference = reference.to_string();
        let mut indices_followed = 0;

        loop {
            let requested_digest = parse_reference(&reference)?;
            let target = format!("{}:{}", repository, reference);

            let mut headers = authorized_headers(&self.auth, endpoint, repository, scope).await?;
            headers.insert(ACCEPT, accept_header()?);
            let url = endpoint.url(&manifest_path(repository, &reference))?;

            self.output.verbose(&format!("Fetching manifest {}", target));
            let response = self.executor.get(&url, headers).await?;
            if response.status != 200 {
                return Err(HttpErrorHandler::handle_registry_error(
                    response.status,
                    "Manifest fetch",
                    &target,
                ));
            }

            let content_type = response.header(CONTENT_TYPE.as_str()).map(str::to_string);
            let header_digest = response
                .header(DOCKER_CONTENT_DIGEST)
                .map(|value| value.trim().to_string());
            let body = response.bytes().await?;

            let computed = Digest::sha256_of(&body);
            if let Some(header_digest) = header_digest {
                if header_digest != computed.to_string() {
                    return Err(RegistryError::validation(
                        ValidationErrorKind::DigestMismatch,
                        format!(
                            "Manifest digest mismatch for {}: header={} computed={}",
                            target, header_digest, computed
                        ),
                    ));
                }
            }
            if let Some(requested) = requested_digest {
                if requested != computed {
                    return Err(RegistryError::validation(
                        ValidationErrorKind::DigestMismatch,
                        format!(
                            "Manifest digest mismatch for {}: expected={} computed={}",
                            target, requested, computed
                        ),
                    ));
                }
            }

            if is_index(content_type.as_deref(), &body) {
                if indices_followed == MAX_INDEX_DEPTH {
                    return Err(RegistryError::validation(
                        ValidationErrorKind::NestedIndex,
                        format!(
                            "Manifest index nesting exceeds {} levels at {}",
                            MAX_INDEX_DEPTH, target
                        ),
                    ));
                }
                indices_followed += 1;

                let index: ManifestIndex = serde_json::from_slice(&body).map_err(|e| {
                    RegistryError::Parse(format!("Failed to parse manifest index {}: {}", target, e))
                })?;
                let selected = index.select(TARGET_OS, TARGET_ARCHITECTURE).ok_or_else(|| {
                    RegistryError::validation(
                        ValidationErrorKind::EmptyManifestList,
                        format!("Manifest index {} has no entries", target),
                    )
                })?;

                self.output.detail(&format!(
                    "Index {} resolved to {} ({})",
                    target,
                    selected.digest,
                    selected
                        .platform
                        .as_ref()
                        .map(|p| format!("{}/{}", p.os, p.architecture))
                        .unwrap_or_else(|| "no platform".to_string())
                ));
                reference = selected.digest.to_string();
                continue;
            }

            let manifest: Manifest = serde_json::from_slice(&body).map_err(|e| {
                RegistryError::Parse(format!("Failed to parse manifest {}: {}", target, e))
            })?;
            let media_type = content_type
                .filter(|value| !value.trim().is_empty())
                .or_else(|| manifest.media_type.clone())
                .unwrap_or_else(|| MediaType::OciManifest.as_str().to_string());

            self.output.verbose(&format!(
                "Manifest {} verified ({}, {} layers)",
                computed.short(),
                self.output.format_size(body.len() as u64),
                manifest.layers.len()
            ));
            return Ok(ManifestResult {
                digest: computed,
                media_type,
                content_length: body.len() as u64,
                manifest: Some(manifest),
            });
        }
    }

    /// Probe a manifest; `None` when the registry answers 404
    pub async fn head_manifest(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        reference: &str,
        scope: &str,
    ) -> Result<Option<ManifestResult>> {
        validate_repository(repository)?;
        parse_reference(reference)?;
        let target = format!("{}:{}", repository, reference);

        let mut headers = authorized_headers(&self.auth, endpoint, repository, scope).await?;
        headers.insert(ACCEPT, accept_header()?);
        let url = endpoint.url(&manifest_path(repository, reference))?;
        let response = self.executor.head(&url, headers).await?;

        match response.status {
            200 => {}
            404 => {
                self.output.detail(&format!("Manifest {} not found", target));
                return Ok(None);
            }
            status => {
                return Err(HttpErrorHandler::handle_registry_error(
                    status,
                    "Manifest HEAD",
                    &target,
                ));
            }
        }

        let digest = response
            .header(DOCKER_CONTENT_DIGEST)
            .and_then(|value| Digest::parse(value.trim()).ok())
            .ok_or_else(|| {
                RegistryError::validation(
                    ValidationErrorKind::MissingHeader,
                    format!("Manifest HEAD for {} has no valid Docker-Content-Digest", target),
                )
            })?;
        let content_length = response
            .content_length()
            .filter(|length| *length > 0)
            .ok_or_else(|| {
                RegistryError::validation(
                    ValidationErrorKind::MissingHeader,
                    format!("Manifest HEAD for {} has no Content-Length", target),
                )
            })?;
        let media_type = response
            .header(CONTENT_TYPE.as_str())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(MediaType::OciManifest.as_str())
            .to_string();

        Ok(Some(ManifestResult {
            digest,
            media_type,
            content_length,
            manifest: None,
        }))
    }
}

fn accept_header() -> Result<HeaderValue> {
    HeaderValue::from_str(&MediaType::manifest_accept_header())
        .map_err(|e| RegistryError::Config(format!("Invalid Accept header: {}", e)))
}

/// Digest references are validated; tags must match the distribution tag grammar
fn parse_reference(reference: &str) -> Result<Option<Digest>> {
    if reference.contains(':') {
        return Digest::parse(reference).map(Some);
    }
    let valid = !reference.is_empty()
        && reference.len() <= 128
        && reference
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(None)
    } else {
        Err(RegistryError::validation(
            ValidationErrorKind::InvalidReference,
            format!("Invalid manifest reference: '{}'", reference),
        ))
    }
}

/// Index detection: trust a known manifest Content-Type, otherwise sniff the body
fn is_index(content_type: Option<&str>, body: &[u8]) -> bool {
    match content_type.and_then(MediaType::from_content_type) {
        Some(media_type) if media_type.is_manifest() => media_type.is_index(),
        _ => {
            let needle = b"\"manifests\"";
            body.windows(needle.len()).any(|window| window == needle)
        }
    }
}
