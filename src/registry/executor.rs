//! Retrying HTTP executor
//!
//! Wraps an [`HttpTransport`] with the per-request timeout, the default
//! `User-Agent` and retries with capped exponential backoff. Only `429`,
//! `502`, `503` and `504` responses and transport failures are retried.

use crate::config::HttpClientConfig;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

#[derive(Clone)]
pub struct HttpExecutor {
    transport: Arc<dyn HttpTransport>,
    config: HttpClientConfig,
    logger: Logger,
}

impl HttpExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, config: HttpClientConfig, logger: Logger) -> Self {
        Self {
            transport,
            config,
            logger,
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    pub async fn get(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse> {
        self.execute(HttpRequest {
            method: HttpMethod::Get,
            url: url.clone(),
            headers,
        })
        .await
    }

    /// HEAD request; the returned body is empty
    pub async fn head(&self, url: &Url, headers: HeaderMap) -> Result<HttpResponse> {
        self.execute(HttpRequest {
            method: HttpMethod::Head,
            url: url.clone(),
            headers,
        })
        .await
    }

    /// Send a request, retrying transient failures within the configured budget.
    ///
    /// Once the budget is spent on a retryable status, that final response is
    /// returned to the caller rather than turned into an error.
    pub async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if !request.headers.contains_key(USER_AGENT) && !self.config.user_agent.is_empty() {
            let value = HeaderValue::from_str(&self.config.user_agent).map_err(|e| {
                RegistryError::Config(format!("Invalid User-Agent '{}': {}", self.config.user_agent, e))
            })?;
            request.headers.insert(USER_AGENT, value);
        }

        let attempts = self.config.max_retries.saturating_add(1);
        let may_retry = request.method.is_idempotent() || !self.config.retry_idempotent_only;
        let mut attempt = 1;

        loop {
            let can_retry = may_retry && attempt < attempts;
            let outcome =
                tokio::time::timeout(self.config.request_timeout, self.transport.send(request.clone()))
                    .await;

            match outcome {
                Ok(Ok(response)) => {
                    if !(can_retry && is_retryable_status(response.status)) {
                        return Ok(response);
                    }
                    self.logger.warning(&format!(
                        "{} {} returned {} (attempt {}/{}), retrying",
                        request.method, request.url, response.status, attempt, attempts
                    ));
                }
                Ok(Err(err)) => {
                    if !(can_retry && matches!(err, RegistryError::Network(_))) {
                        return Err(err);
                    }
                    self.logger.warning(&format!(
                        "{} {} failed (attempt {}/{}): {}, retrying",
                        request.method, request.url, attempt, attempts, err
                    ));
                }
                Err(_) => {
                    let err = RegistryError::Network(format!(
                        "{} {} timed out after {}",
                        request.method,
                        request.url,
                        self.logger.format_duration(self.config.request_timeout)
                    ));
                    if !can_retry {
                        return Err(err);
                    }
                    self.logger.warning(&format!(
                        "{} (attempt {}/{}), retrying",
                        err, attempt, attempts
                    ));
                }
            }

            let delay = self.backoff_delay(attempt);
            self.logger.debug(&format!(
                "Backing off {} before attempt {}",
                self.logger.format_duration(delay),
                attempt + 1
            ));
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Sleep before the retry following `attempt` (1-based):
    /// `min(max_backoff, initial * 2^(attempt-1) + jitter)` with jitter in `[0, initial]`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.config.initial_backoff.as_millis() as u64;
        let max_ms = self.config.max_backoff.as_millis() as u64;
        let exponent = attempt.saturating_sub(1).min(20);
        let exponential = base_ms.saturating_mul(1u64 << exponent);
        let jitter = if base_ms > 0 {
            random_u32() as u64 % (base_ms + 1)
        } else {
            0
        };
        Duration::from_millis(exponential.saturating_add(jitter).min(max_ms))
    }
}

/// Thread-local xorshift for backoff jitter
fn random_u32() -> u32 {
    use std::cell::Cell;
    use std::time::SystemTime;

    thread_local! {
        static STATE: Cell<u32> = Cell::new(
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u32 | 1)
                .unwrap_or(12345)
        );
    }

    STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state.set(x);
        x
    })
}
