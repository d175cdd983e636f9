//! Image content model
//!
//! [`Digest`] identifies every blob and manifest the puller touches, and the
//! [`manifest`] module holds the JSON documents a registry serves for an image.

pub mod digest;
pub mod manifest;

pub use digest::{Digest, DigestHasher, EMPTY_LAYER_DIGEST};
pub use manifest::{Descriptor, Manifest, ManifestIndex, MediaType, Platform, TagList};
