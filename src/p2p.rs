//! Peer-to-peer blob exchange contract

use crate::error::Result;
use crate::image::Digest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait P2PExecutor: Send + Sync {
    /// Try to obtain a blob from peers; `None` when no peer has it
    async fn fetch(&self, digest: &Digest, size: u64, media_type: &str) -> Result<Option<PathBuf>>;

    /// Offer a downloaded blob to peers (best effort)
    async fn publish(&self, digest: &Digest, path: &Path, size: u64, media_type: &str) -> Result<()>;
}

/// P2P executor for deployments without a swarm
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpP2P;

#[async_trait]
impl P2PExecutor for NoOpP2P {
    async fn fetch(&self, _digest: &Digest, _size: u64, _media_type: &str) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn publish(&self, _digest: &Digest, _path: &Path, _size: u64, _media_type: &str) -> Result<()> {
        Ok(())
    }
}
