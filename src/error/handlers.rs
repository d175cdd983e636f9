//! Standardized error handling patterns for pull operations

use crate::error::RegistryError;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Build a `BadStatus` error for a registry endpoint with a status-specific description
    pub fn handle_registry_error(status: u16, operation: &str, target: &str) -> RegistryError {
        let message = match status {
            401 => format!("Unauthorized to perform {} for {}", operation, target),
            403 => format!(
                "Forbidden: insufficient permissions for {} of {}",
                operation, target
            ),
            404 => format!("{} not found: {}", operation, target),
            416 => format!("Requested range not satisfiable during {} of {}", operation, target),
            429 => format!("Rate limited during {} of {}", operation, target),
            500 => format!("Registry server error during {} of {}", operation, target),
            502..=504 => format!("Registry unavailable for {} of {}", operation, target),
            _ => format!("{} failed for {} (status {})", operation, target, status),
        };

        RegistryError::bad_status(status, message)
    }

    /// Map a token endpoint status to a readable reason
    pub fn describe_token_status(status: u16) -> &'static str {
        match status {
            400 => "Invalid token request parameters",
            401 => "Invalid credentials provided",
            403 => "Access denied - insufficient permissions",
            404 => "Authentication endpoint not found",
            429 => "Token endpoint rate limited",
            500..=599 => "Token endpoint server error",
            _ => "Token endpoint failed",
        }
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Network(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            RegistryError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("dns") {
            RegistryError::Network(format!("DNS resolution error for {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            RegistryError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            RegistryError::Network(format!("{} network error: {}", context, error))
        }
    }

    /// Wrap a stream read failure that happened mid-body
    pub fn handle_body_error(error: &std::io::Error, context: &str) -> RegistryError {
        RegistryError::Network(format!("{} body read failed: {}", context, error))
    }
}
