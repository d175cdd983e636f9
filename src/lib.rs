//! Docker Image Puller Library
//!
//! Pull-side client for OCI/Docker registries. The library root organizes the
//! registry protocol stack (transport, retries, token auth, manifests, blobs)
//! and the dispatcher that sources blobs from a local cache, peers or the
//! registry.

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod image;
pub mod logging;
pub mod p2p;
pub mod registry;

pub use config::{Credentials, PullerConfig, RegistryEndpoint};
pub use dispatcher::{FetchResult, FetchSource, ImageRef, RequestDispatcher};
pub use error::{RegistryError, Result};
pub use image::Digest;
pub use logging::Logger;
pub use registry::{RegistryClient, RegistryClientBuilder};
