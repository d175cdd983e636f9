//! Error types and handlers for registry pull operations
//!
//! Every failure surfaced by this crate is a [`RegistryError`]. The four
//! protocol families (auth, HTTP, validation, dispatcher) carry a kind enum so
//! callers can match exhaustively; the remaining variants wrap transport and
//! local failures.

pub mod handlers;

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Failure stage of the ping/challenge/token handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    UnexpectedPingStatus,
    MissingChallenge,
    TokenFailed,
    NoToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    BadStatus,
}

/// Integrity and protocol-shape violations. Never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    InvalidDigest,
    InvalidReference,
    DigestMismatch,
    SizeMismatch,
    EmptyManifestList,
    NestedIndex,
    MissingHeader,
    MissingLength,
    PartialContent,
}

/// Problems with a fetch result handed over to assembly/runtime collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherErrorKind {
    MissingField,
    PathMissing,
    NotAFile,
    EmptyFile,
    Assembly,
    RuntimeImport,
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthErrorKind::UnexpectedPingStatus => "unexpected ping status",
            AuthErrorKind::MissingChallenge => "missing challenge",
            AuthErrorKind::TokenFailed => "token request failed",
            AuthErrorKind::NoToken => "no token in response",
        };
        f.write_str(name)
    }
}

impl fmt::Display for HttpErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpErrorKind::BadStatus => f.write_str("bad status"),
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationErrorKind::InvalidDigest => "invalid digest",
            ValidationErrorKind::InvalidReference => "invalid reference",
            ValidationErrorKind::DigestMismatch => "digest mismatch",
            ValidationErrorKind::SizeMismatch => "size mismatch",
            ValidationErrorKind::EmptyManifestList => "empty manifest list",
            ValidationErrorKind::NestedIndex => "nested manifest index",
            ValidationErrorKind::MissingHeader => "missing header",
            ValidationErrorKind::MissingLength => "missing content length",
            ValidationErrorKind::PartialContent => "partial content",
        };
        f.write_str(name)
    }
}

impl fmt::Display for DispatcherErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DispatcherErrorKind::MissingField => "missing field",
            DispatcherErrorKind::PathMissing => "path missing",
            DispatcherErrorKind::NotAFile => "not a regular file",
            DispatcherErrorKind::EmptyFile => "empty file",
            DispatcherErrorKind::Assembly => "archive assembly failed",
            DispatcherErrorKind::RuntimeImport => "runtime import failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Authentication handshake errors
    #[error("Authentication error ({kind}): {message}")]
    Auth {
        kind: AuthErrorKind,
        status: Option<u16>,
        message: String,
    },
    /// Non-success status from a registry endpoint
    #[error("HTTP error ({kind}, status {status}): {message}")]
    Http {
        kind: HttpErrorKind,
        status: u16,
        message: String,
    },
    /// Digest, size and header validation errors
    #[error("Validation error ({kind}): {message}")]
    Validation {
        kind: ValidationErrorKind,
        message: String,
    },
    /// Fetch result hand-over errors
    #[error("Dispatcher error ({kind}): {message}")]
    Dispatcher {
        kind: DispatcherErrorKind,
        message: String,
    },
    /// Network related errors
    #[error("Network error: {0}")]
    Network(String),
    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),
    /// Parse errors
    #[error("Parse error: {0}")]
    Parse(String),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// The operation was aborted before completion
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl RegistryError {
    pub fn auth(kind: AuthErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        RegistryError::Auth {
            kind,
            status,
            message: message.into(),
        }
    }

    pub fn bad_status(status: u16, message: impl Into<String>) -> Self {
        RegistryError::Http {
            kind: HttpErrorKind::BadStatus,
            status,
            message: message.into(),
        }
    }

    pub fn validation(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        RegistryError::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn dispatcher(kind: DispatcherErrorKind, message: impl Into<String>) -> Self {
        RegistryError::Dispatcher {
            kind,
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Auth { status, .. } => *status,
            RegistryError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn validation_kind(&self) -> Option<ValidationErrorKind> {
        match self {
            RegistryError::Validation { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn auth_kind(&self) -> Option<AuthErrorKind> {
        match self {
            RegistryError::Auth { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn dispatcher_kind(&self) -> Option<DispatcherErrorKind> {
        match self {
            RegistryError::Dispatcher { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "request")
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Config(format!("invalid URL: {}", err))
    }
}
