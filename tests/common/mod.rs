//! Shared test doubles for registry integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use docker_image_puller::config::{HttpClientConfig, PullerConfig, RegistryEndpoint};
use docker_image_puller::error::Result;
use docker_image_puller::image::{Descriptor, Digest, Manifest, MediaType};
use docker_image_puller::logging::Logger;
use docker_image_puller::registry::transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};
use docker_image_puller::registry::RegistryClient;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const HOST: &str = "registry.test";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// Transport that answers every request through a closure and records it
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: HttpMethod, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.path() == path)
            .count()
    }

    pub fn last_to(&self, path: &str) -> Option<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.url.path() == path)
            .cloned()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
        });
        (self.handler)(&request)
    }
}

pub fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    map
}

pub fn reply(status: u16, pairs: &[(&str, &str)], body: impl Into<Vec<u8>>) -> Result<HttpResponse> {
    Ok(HttpResponse::from_bytes(status, headers(pairs), body.into()))
}

pub fn empty(status: u16, pairs: &[(&str, &str)]) -> Result<HttpResponse> {
    Ok(HttpResponse::empty(status, headers(pairs)))
}

pub fn endpoint() -> RegistryEndpoint {
    RegistryEndpoint::https(HOST)
}

/// Defaults with millisecond backoff so retry tests stay fast
pub fn fast_config() -> PullerConfig {
    PullerConfig {
        http: HttpClientConfig::default()
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5)),
        ..PullerConfig::default()
    }
}

pub fn client_with(transport: Arc<ScriptedTransport>, config: PullerConfig) -> RegistryClient {
    client_for(endpoint(), transport, config)
}

pub fn client_for(
    endpoint: RegistryEndpoint,
    transport: Arc<ScriptedTransport>,
    config: PullerConfig,
) -> RegistryClient {
    RegistryClient::builder(endpoint)
        .with_config(config)
        .with_logger(Logger::new_quiet())
        .with_transport(transport)
        .build()
        .unwrap()
}

/// Serialized single-platform manifest and its parsed form
pub fn manifest_json(config: &[u8], layers: &[&[u8]]) -> (Vec<u8>, Manifest) {
    let manifest = Manifest {
        schema_version: 2,
        media_type: Some(MediaType::OciManifest.as_str().to_string()),
        config: Descriptor::new(
            MediaType::OciConfig.as_str(),
            Digest::sha256_of(config),
            config.len() as u64,
        ),
        layers: layers
            .iter()
            .map(|layer| {
                Descriptor::new(
                    MediaType::OciLayerGzip.as_str(),
                    Digest::sha256_of(layer),
                    layer.len() as u64,
                )
            })
            .collect(),
        annotations: None,
    };
    (serde_json::to_vec(&manifest).unwrap(), manifest)
}
