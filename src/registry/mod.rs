//! Docker Registry HTTP API v2 pull client
//!
//! Layered bottom-up: [`transport`] sends single requests, [`executor`]
//! adds timeouts and retries, [`auth`] runs the token handshake on top of a
//! shared [`token_cache`], and [`operations`] implements manifest, blob and
//! tag reads. [`client`] binds all of it to one endpoint.

pub mod auth;
pub mod client;
pub mod executor;
pub mod operations;
pub mod sink;
pub mod token_cache;
pub mod transport;

pub use auth::{AuthChallenge, AuthService};
pub use client::{RegistryApi, RegistryClient, RegistryClientBuilder};
pub use executor::HttpExecutor;
pub use operations::{BlobRequest, BlobResult, ByteRange, ManifestResult};
pub use sink::{BlobSink, FileBlobSink};
pub use token_cache::TokenCache;
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
