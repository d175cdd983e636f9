//! SHA256 digests for content-addressed registry objects
//!
//! A [`Digest`] can only be built from a well-formed `sha256:<64 lowercase hex>`
//! string or from hashing bytes, so holding one means the value is valid.
//! [`DigestHasher`] computes a digest incrementally while a body streams.

use crate::error::{RegistryError, Result, ValidationErrorKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::str::FromStr;

/// Standard SHA256 digest for empty blobs
pub const EMPTY_LAYER_DIGEST: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SHA256_ALGORITHM: &str = "sha256";
const SHA256_HEX_LEN: usize = 64;

/// Validated content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    hex: String,
}

impl Digest {
    /// Parse `sha256:<hex>`
    pub fn parse(value: &str) -> Result<Self> {
        let (algorithm, hex) = value.split_once(':').ok_or_else(|| {
            RegistryError::validation(
                ValidationErrorKind::InvalidDigest,
                format!("Digest missing algorithm prefix: {}", value),
            )
        })?;

        if algorithm != SHA256_ALGORITHM {
            return Err(RegistryError::validation(
                ValidationErrorKind::InvalidDigest,
                format!("Unsupported digest algorithm '{}' in {}", algorithm, value),
            ));
        }
        if !is_valid_sha256_hex(hex) {
            return Err(RegistryError::validation(
                ValidationErrorKind::InvalidDigest,
                format!(
                    "Invalid SHA256 hex in digest {}: expected {} lowercase hex characters",
                    value, SHA256_HEX_LEN
                ),
            ));
        }

        Ok(Self {
            algorithm: algorithm.to_string(),
            hex: hex.to_string(),
        })
    }

    /// Digest of an in-memory byte slice
    pub fn sha256_of(data: &[u8]) -> Self {
        let mut hasher = DigestHasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// Short form for log lines
    pub fn short(&self) -> &str {
        &self.hex[..12]
    }

    pub fn is_empty_blob(&self) -> bool {
        self.to_string() == EMPTY_LAYER_DIGEST
    }
}

fn is_valid_sha256_hex(hex: &str) -> bool {
    hex.len() == SHA256_HEX_LEN
        && hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Digest::parse(s)
    }
}

impl TryFrom<String> for Digest {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}

/// Incremental SHA256 over a streamed body
#[derive(Clone, Default)]
pub struct DigestHasher {
    hasher: Sha256,
    bytes: u64,
}

impl DigestHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    /// Bytes hashed so far
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize(self) -> Digest {
        Digest {
            algorithm: SHA256_ALGORITHM.to_string(),
            hex: hex::encode(self.hasher.finalize()),
        }
    }
}
