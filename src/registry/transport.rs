//! HTTP transport used by every registry call
//!
//! The [`HttpTransport`] trait is the single seam between the registry
//! services and the network. [`ReqwestTransport`] is the production
//! implementation; tests plug in scripted transports.

use crate::config::HttpClientConfig;
use crate::error::handlers::NetworkErrorHandler;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::pin::Pin;
use url::Url;

pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
}

impl HttpMethod {
    pub fn is_idempotent(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Head)
    }

    fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Head => f.write_str("HEAD"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header; invalid names or values are rejected as configuration errors
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| RegistryError::Config(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| RegistryError::Config(format!("Invalid value for header {}: {}", name, e)))?;
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Status, headers and a streaming body
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    body: BodyStream,
}

impl HttpResponse {
    pub fn new(status: u16, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(status, headers, Box::pin(stream::once(async move { Ok(body) })))
    }

    pub fn empty(status: u16, headers: HeaderMap) -> Self {
        Self::new(status, headers, Box::pin(stream::empty()))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a repeated header
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn header_u64(&self, name: &str) -> Option<u64> {
        self.header(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header_u64("content-length")
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Read the whole body into memory
    pub async fn bytes(self) -> Result<Bytes> {
        let mut body = self.body;
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| NetworkErrorHandler::handle_body_error(&e, "Response"))?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Sends a single HTTP request. Retries and timeouts live above this layer.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            // Bounds each read, so a body that stalls mid-stream fails
            .read_timeout(config.request_timeout)
            .danger_accept_invalid_certs(config.skip_tls)
            .build()
            .map_err(|e| RegistryError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let context = format!("{} {}", request.method, request.url);
        let response = self
            .client
            .request(request.method.as_reqwest(), request.url)
            .headers(request.headers)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, &context))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(HttpResponse::new(status, headers, Box::pin(body)))
    }
}
