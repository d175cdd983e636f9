//! Authentication for Docker registry access
//!
//! Implements the registry token handshake: ping `/v2/`, read the Bearer
//! challenge from a `401`, then exchange credentials at the challenge realm
//! for a token. Tokens are cached per endpoint, scope and credentials.

use crate::config::{AuthConfig, Credentials, RegistryEndpoint};
use crate::error::handlers::HttpErrorHandler;
use crate::error::{AuthErrorKind, RegistryError, Result};
use crate::logging::Logger;
use crate::registry::executor::HttpExecutor;
use crate::registry::token_cache::TokenCache;
use crate::registry::transport::HttpResponse;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

const TOKEN_EXPIRES_HEADER: &str = "docker-token-expires-in";

/// Parsed `WWW-Authenticate: Bearer ...` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parse a single header value; `None` unless it is a Bearer challenge with a realm
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut realm = None;
        let mut service = None;
        let mut scope = None;
        for (key, value) in parse_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        Some(Self {
            realm: realm.filter(|r| !r.is_empty())?,
            service,
            scope,
        })
    }

    /// Token endpoint URL with `service` and `scope` appended to any existing query
    pub fn token_url(&self, scope: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.realm).map_err(|e| {
            RegistryError::auth(
                AuthErrorKind::TokenFailed,
                None,
                format!("Invalid token realm '{}': {}", self.realm, e),
            )
        })?;
        let scope = scope.filter(|s| !s.trim().is_empty()).or(self.scope.as_deref());
        if self.service.is_some() || scope.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(service) = &self.service {
                query.append_pair("service", service);
            }
            if let Some(scope) = scope {
                query.append_pair("scope", scope);
            }
        }
        Ok(url)
    }
}

/// `key=value` / `key="quoted, value"` pairs; keys are lowercased
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.next() != Some('=') {
            continue;
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        let key = key.trim().to_ascii_lowercase();
        if !key.is_empty() {
            params.push((key, value));
        }
    }

    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn effective_token(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token.filter(|t| !t.is_empty()))
    }
}

struct IssuedToken {
    token: String,
    ttl_seconds: Option<u64>,
}

/// Produces `Authorization` header values for registry requests
#[derive(Clone)]
pub struct AuthService {
    executor: HttpExecutor,
    cache: Arc<TokenCache>,
    config: AuthConfig,
    logger: Logger,
}

impl AuthService {
    pub fn new(executor: HttpExecutor, cache: Arc<TokenCache>, config: AuthConfig, logger: Logger) -> Self {
        Self {
            executor,
            cache,
            config,
            logger,
        }
    }

    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// `Some("Bearer ...")` when the registry requires a token, `None` for open registries
    pub async fn get_auth_header(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        scope: &str,
    ) -> Result<Option<String>> {
        let fingerprint = endpoint.credentials.as_ref().map(Credentials::fingerprint);
        let cache_key = TokenCache::key(&endpoint.authority(), scope, fingerprint.as_deref());
        if let Some(token) = self.cache.get(&cache_key) {
            self.logger
                .trace(&format!("Using cached token for {} ({})", repository, scope));
            return Ok(Some(format!("Bearer {}", token)));
        }

        let ping_url = endpoint.url("/v2/")?;
        self.logger.detail(&format!("Pinging {}", ping_url));
        let ping = self.executor.head(&ping_url, HeaderMap::new()).await?;

        match ping.status {
            200 => {
                self.logger
                    .verbose(&format!("{} does not require authentication", endpoint.authority()));
                return Ok(None);
            }
            401 => {}
            status => {
                return Err(RegistryError::auth(
                    AuthErrorKind::UnexpectedPingStatus,
                    Some(status),
                    format!("Unexpected ping status {} from {}", status, ping_url),
                ));
            }
        }

        let challenge = ping
            .header_values(WWW_AUTHENTICATE.as_str())
            .into_iter()
            .find_map(AuthChallenge::parse)
            .ok_or_else(|| {
                RegistryError::auth(
                    AuthErrorKind::MissingChallenge,
                    Some(401),
                    format!("No Bearer challenge in WWW-Authenticate from {}", ping_url),
                )
            })?;
        self.logger.detail(&format!(
            "Auth challenge received: realm={}, service={:?}",
            challenge.realm, challenge.service
        ));

        let issued = self
            .fetch_token(&challenge, endpoint.credentials.as_ref(), scope)
            .await?;
        let ttl = match issued.ttl_seconds.or_else(|| ttl_from_headers(&ping)) {
            Some(ttl) => ttl,
            None => {
                self.logger.warning(&format!(
                    "No token TTL in response; using default {}s",
                    self.config.default_token_ttl_secs
                ));
                self.config.default_token_ttl_secs
            }
        };

        self.cache.put(&cache_key, &issued.token, ttl);
        self.logger.verbose(&format!(
            "Token obtained for {} (length: {} chars, ttl {}s)",
            repository,
            issued.token.len(),
            ttl
        ));
        Ok(Some(format!("Bearer {}", issued.token)))
    }

    async fn fetch_token(
        &self,
        challenge: &AuthChallenge,
        credentials: Option<&Credentials>,
        scope: &str,
    ) -> Result<IssuedToken> {
        let url = challenge.token_url(Some(scope))?;
        self.logger.detail(&format!("Requesting token from: {}", url));

        let mut headers = HeaderMap::new();
        if let Some(credentials) = credentials {
            let value = match credentials {
                Credentials::IdentityToken { token } => format!("Bearer {}", token),
                Credentials::Basic { username, password } => {
                    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
                }
            };
            let value = HeaderValue::from_str(&value).map_err(|_| {
                RegistryError::auth(
                    AuthErrorKind::TokenFailed,
                    None,
                    "Credentials contain characters not allowed in a header",
                )
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let token_failed = |e: RegistryError| {
            RegistryError::auth(
                AuthErrorKind::TokenFailed,
                None,
                format!("Token request to {} failed: {}", challenge.realm, e),
            )
        };

        let response = self.executor.get(&url, headers).await.map_err(token_failed)?;
        let status = response.status;
        if status != 200 {
            return Err(RegistryError::auth(
                AuthErrorKind::TokenFailed,
                Some(status),
                format!(
                    "Token endpoint returned {}: {}",
                    status,
                    HttpErrorHandler::describe_token_status(status)
                ),
            ));
        }

        let header_ttl = ttl_from_headers(&response);
        let body = response.bytes().await.map_err(token_failed)?;
        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| token_failed(RegistryError::Parse(e.to_string())))?;
        let body_ttl = parsed.expires_in;
        let token = parsed.effective_token().ok_or_else(|| {
            RegistryError::auth(
                AuthErrorKind::NoToken,
                Some(status),
                format!("Token response from {} has no token", challenge.realm),
            )
        })?;

        Ok(IssuedToken {
            token,
            ttl_seconds: body_ttl.or(header_ttl),
        })
    }
}

fn ttl_from_headers(response: &HttpResponse) -> Option<u64> {
    response.header_u64(TOKEN_EXPIRES_HEADER)
}
