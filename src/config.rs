//! Configuration for the registry client and the request dispatcher
//!
//! All settings are plain values handed to constructors. Nothing in this crate
//! reads configuration from globals or the environment.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Registry credentials (basic or identity token)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credentials {
    Basic { username: String, password: String },
    IdentityToken { token: String },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn identity_token(token: impl Into<String>) -> Self {
        Credentials::IdentityToken {
            token: token.into(),
        }
    }

    /// Stable, non-reversible identifier used to partition cached tokens
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Credentials::Basic { username, password } => {
                hasher.update(b"basic\0");
                hasher.update(username.as_bytes());
                hasher.update(b"\0");
                hasher.update(password.as_bytes());
            }
            Credentials::IdentityToken { token } => {
                hasher.update(b"identity\0");
                hasher.update(token.as_bytes());
            }
        }
        hex::encode(&hasher.finalize()[..8])
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Credentials::Basic { username, .. } if username.is_empty() => Err(
                RegistryError::Config("Username cannot be empty".to_string()),
            ),
            Credentials::IdentityToken { token } if token.is_empty() => Err(
                RegistryError::Config("Identity token cannot be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::IdentityToken { .. } => f
                .debug_struct("IdentityToken")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// A registry's network address plus static credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEndpoint {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub credentials: Option<Credentials>,
}

impl RegistryEndpoint {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            credentials: None,
        }
    }

    pub fn https(host: impl Into<String>) -> Self {
        Self::new("https", host, None)
    }

    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Self::new("http", host, Some(port))
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Parse `https://host[:port]`; a bare `host[:port]` defaults to https
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(RegistryError::Config(
                "Registry address cannot be empty".to_string(),
            ));
        }
        let with_scheme = if address.contains("://") {
            address.to_string()
        } else {
            format!("https://{}", address)
        };
        let url = Url::parse(&with_scheme)?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RegistryError::Config(format!(
                    "Unsupported registry scheme: {}",
                    other
                )));
            }
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| RegistryError::Config(format!("Registry address has no host: {}", address)))?;
        if !(url.path().is_empty() || url.path() == "/") {
            return Err(RegistryError::Config(format!(
                "Registry address must not contain a path: {}",
                address
            )));
        }

        Ok(Self::new(url.scheme(), host, url.port()))
    }

    /// `host` or `host:port`
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.authority())
    }

    /// Absolute URL for a registry API path such as `/v2/`
    pub fn url(&self, path: &str) -> Result<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        Ok(Url::parse(&format!("{}{}", self.base_url(), path))?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(RegistryError::Config("Registry host cannot be empty".to_string()));
        }
        if self.scheme != "http" && self.scheme != "https" {
            return Err(RegistryError::Config(format!(
                "Unsupported registry scheme: {}",
                self.scheme
            )));
        }
        if let Some(credentials) = &self.credentials {
            credentials.validate()?;
        }
        Ok(())
    }
}

/// HTTP client configuration for registry calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub retry_idempotent_only: bool,
    pub user_agent: String,
    pub skip_tls: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            retry_idempotent_only: true,
            user_agent: format!("docker-image-puller/{}", env!("CARGO_PKG_VERSION")),
            skip_tls: false,
        }
    }
}

impl HttpClientConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(RegistryError::Config(
                "Timeouts must be greater than 0".to_string(),
            ));
        }
        if self.initial_backoff > self.max_backoff {
            return Err(RegistryError::Config(format!(
                "initial_backoff ({:?}) cannot exceed max_backoff ({:?})",
                self.initial_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

/// Token handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// TTL used when neither the token body nor headers carry one
    pub default_token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_token_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeMode {
    /// Send `Range` when a request asks for one
    Auto,
    /// Never send `Range`
    Off,
}

/// How a 206 response is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialValidation {
    /// Accept the slice; only the byte count is checked
    Skip,
    /// Reject partial responses
    RequireFull,
}

/// Range handling policy for blob downloads
///
/// Every combination of these settings is valid, so there is no `validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub mode: RangeMode,
    pub partial_validation: PartialValidation,
    pub fallback_to_full_on_416: bool,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            mode: RangeMode::Auto,
            partial_validation: PartialValidation::Skip,
            fallback_to_full_on_416: true,
        }
    }
}

/// Configuration for the request dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Concurrent registry downloads; zero or negative means unbounded
    pub max_concurrent_registry: i32,
    /// Directory for downloaded blobs, system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_registry: 4,
            temp_dir: None,
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_concurrent_registry(mut self, limit: i32) -> Self {
        self.max_concurrent_registry = limit;
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Permit count, `None` when unbounded
    pub fn registry_limit(&self) -> Option<usize> {
        (self.max_concurrent_registry > 0).then_some(self.max_concurrent_registry as usize)
    }

    pub fn resolved_temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Result<()> {
        let Some(dir) = &self.temp_dir else {
            return Ok(());
        };
        if dir.as_os_str().is_empty() {
            return Err(RegistryError::Config("Temp directory cannot be empty".to_string()));
        }
        // A missing directory is created on first download
        if dir.exists() && !dir.is_dir() {
            return Err(RegistryError::Config(format!(
                "Temp directory {} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }
}

/// Complete puller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullerConfig {
    pub http: HttpClientConfig,
    pub auth: AuthConfig,
    pub range: RangeConfig,
    pub dispatcher: DispatcherConfig,
}

impl PullerConfig {
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.dispatcher.validate()
    }
}
