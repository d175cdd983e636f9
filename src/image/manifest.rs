//! Manifest, index and descriptor models
//!
//! These types mirror the OCI image format and the Docker v2 schema 2 JSON
//! documents. Unknown fields are ignored so that registries adding
//! annotations or vendor extensions do not break parsing.

use crate::image::digest::Digest;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Media types understood by the puller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    OciManifest,
    OciIndex,
    OciConfig,
    OciLayer,
    OciLayerGzip,
    OciLayerZstd,
    DockerManifest,
    DockerManifestList,
    DockerConfig,
    DockerLayerGzip,
    DockerForeignLayerGzip,
    OctetStream,
}

impl MediaType {
    pub const ALL: [MediaType; 12] = [
        MediaType::OciManifest,
        MediaType::OciIndex,
        MediaType::OciConfig,
        MediaType::OciLayer,
        MediaType::OciLayerGzip,
        MediaType::OciLayerZstd,
        MediaType::DockerManifest,
        MediaType::DockerManifestList,
        MediaType::DockerConfig,
        MediaType::DockerLayerGzip,
        MediaType::DockerForeignLayerGzip,
        MediaType::OctetStream,
    ];

    /// Manifest types requested when fetching a manifest, in preference order
    pub const MANIFEST_ACCEPT: [MediaType; 4] = [
        MediaType::OciManifest,
        MediaType::DockerManifest,
        MediaType::OciIndex,
        MediaType::DockerManifestList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::OciManifest => "application/vnd.oci.image.manifest.v1+json",
            MediaType::OciIndex => "application/vnd.oci.image.index.v1+json",
            MediaType::OciConfig => "application/vnd.oci.image.config.v1+json",
            MediaType::OciLayer => "application/vnd.oci.image.layer.v1.tar",
            MediaType::OciLayerGzip => "application/vnd.oci.image.layer.v1.tar+gzip",
            MediaType::OciLayerZstd => "application/vnd.oci.image.layer.v1.tar+zstd",
            MediaType::DockerManifest => "application/vnd.docker.distribution.manifest.v2+json",
            MediaType::DockerManifestList => {
                "application/vnd.docker.distribution.manifest.list.v2+json"
            }
            MediaType::DockerConfig => "application/vnd.docker.container.image.v1+json",
            MediaType::DockerLayerGzip => "application/vnd.docker.image.rootfs.diff.tar.gzip",
            MediaType::DockerForeignLayerGzip => {
                "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip"
            }
            MediaType::OctetStream => "application/octet-stream",
        }
    }

    /// Look up a media type from a `Content-Type` value, ignoring parameters and case
    pub fn from_content_type(content_type: &str) -> Option<MediaType> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        MediaType::ALL
            .into_iter()
            .find(|media_type| media_type.as_str() == essence)
    }

    pub fn is_index(&self) -> bool {
        matches!(self, MediaType::OciIndex | MediaType::DockerManifestList)
    }

    pub fn is_manifest(&self) -> bool {
        matches!(
            self,
            MediaType::OciManifest
                | MediaType::DockerManifest
                | MediaType::OciIndex
                | MediaType::DockerManifestList
        )
    }

    pub fn is_layer(&self) -> bool {
        matches!(
            self,
            MediaType::OciLayer
                | MediaType::OciLayerGzip
                | MediaType::OciLayerZstd
                | MediaType::DockerLayerGzip
                | MediaType::DockerForeignLayerGzip
        )
    }

    /// `Accept` header value for manifest requests
    pub fn manifest_accept_header() -> String {
        MediaType::MANIFEST_ACCEPT
            .iter()
            .map(|media_type| media_type.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
}

impl Platform {
    pub fn linux_amd64() -> Self {
        Self {
            architecture: "amd64".to_string(),
            os: "linux".to_string(),
            variant: None,
            os_version: None,
        }
    }

    /// Case-insensitive os/architecture match
    pub fn matches(&self, os: &str, architecture: &str) -> bool {
        self.os.eq_ignore_ascii_case(os) && self.architecture.eq_ignore_ascii_case(architecture)
    }
}

/// Reference to content by digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            platform: None,
            annotations: None,
        }
    }
}

/// Single-platform image manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

impl Manifest {
    /// Config followed by every layer, in manifest order
    pub fn blobs(&self) -> impl Iterator<Item = &Descriptor> {
        std::iter::once(&self.config).chain(self.layers.iter())
    }

    pub fn total_size(&self) -> u64 {
        self.blobs().map(|descriptor| descriptor.size).sum()
    }
}

/// Multi-platform manifest index (OCI index or Docker manifest list)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub manifests: Vec<Descriptor>,
}

impl ManifestIndex {
    /// Entry for the requested platform, falling back to the first entry
    pub fn select(&self, os: &str, architecture: &str) -> Option<&Descriptor> {
        self.manifests
            .iter()
            .find(|entry| {
                entry
                    .platform
                    .as_ref()
                    .is_some_and(|platform| platform.matches(os, architecture))
            })
            .or_else(|| self.manifests.first())
    }
}

/// Response of `GET /v2/{name}/tags/list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagList {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
