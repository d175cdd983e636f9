//! Content cache contract
//!
//! The puller consumes a content-addressed blob cache through
//! [`CacheAdapter`]; storage is provided by the embedding application.

use crate::error::Result;
use crate::image::Digest;
use async_trait::async_trait;
use std::path::PathBuf;

/// Cached blob descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub digest: Digest,
    pub size: u64,
    pub media_type: String,
    /// Opaque cache key, turned into a path by [`CacheAdapter::resolve`]
    pub key: String,
}

/// Bytes offered to the cache: a file the cache may copy or link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePayload {
    pub path: PathBuf,
    pub size: u64,
}

impl CachePayload {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn has(&self, digest: &Digest) -> Result<bool>;

    async fn get(&self, digest: &Digest) -> Result<Option<CacheEntry>>;

    /// Local path for a cache key, if the blob is still present
    async fn resolve(&self, key: &str) -> Result<Option<PathBuf>>;

    async fn put(&self, digest: &Digest, payload: CachePayload, media_type: &str) -> Result<CacheEntry>;
}
