mod common;

use common::{empty, endpoint, fast_config, reply, ScriptedTransport, HOST};
use docker_image_puller::config::{AuthConfig, Credentials, RegistryEndpoint};
use docker_image_puller::error::AuthErrorKind;
use docker_image_puller::logging::Logger;
use docker_image_puller::registry::auth::AuthService;
use docker_image_puller::registry::executor::HttpExecutor;
use docker_image_puller::registry::token_cache::TokenCache;
use docker_image_puller::registry::transport::HttpMethod;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const SCOPE: &str = "repository:library/alpine:pull";
const CHALLENGE: &str =
    r#"Bearer realm="https://auth.test/token",service="registry.test",scope="repository:library/alpine:pull""#;

fn auth_service(transport: Arc<ScriptedTransport>) -> AuthService {
    let config = fast_config();
    let executor = HttpExecutor::new(transport, config.http, Logger::new_quiet());
    AuthService::new(
        executor,
        Arc::new(TokenCache::new()),
        AuthConfig::default(),
        Logger::new_quiet(),
    )
}

fn token_registry(token_body: &'static str) -> Arc<ScriptedTransport> {
    ScriptedTransport::new(move |request| match request.url.host_str() {
        Some("auth.test") => reply(200, &[("content-type", "application/json")], token_body),
        _ => empty(401, &[("www-authenticate", CHALLENGE)]),
    })
}

#[tokio::test]
async fn test_open_registry_needs_no_token() {
    let transport = ScriptedTransport::new(|_| empty(200, &[]));
    let auth = auth_service(transport.clone());

    let header = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();

    assert_eq!(header, None);
    assert_eq!(transport.count(HttpMethod::Head, "/v2/"), 1);
}

#[tokio::test]
async fn test_token_is_cached_between_calls() {
    let transport = token_registry(r#"{"token":"t-123","expires_in":300}"#);
    let auth = auth_service(transport.clone());

    let first = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    let second = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();

    assert_eq!(first.as_deref(), Some("Bearer t-123"));
    assert_eq!(second, first);
    assert_eq!(transport.count(HttpMethod::Head, "/v2/"), 1);
    assert_eq!(transport.count(HttpMethod::Get, "/token"), 1);
    assert_eq!(auth.token_cache().len(), 1);
}

#[tokio::test]
async fn test_token_request_carries_service_scope_and_basic_auth() {
    let transport = token_registry(r#"{"access_token":"t-abc"}"#);
    let auth = auth_service(transport.clone());
    let endpoint = RegistryEndpoint::https(HOST).with_credentials(Credentials::basic("alice", "s3cret"));

    let header = auth
        .get_auth_header(&endpoint, "library/alpine", "repository:library/alpine:pull")
        .await
        .unwrap();
    assert_eq!(header.as_deref(), Some("Bearer t-abc"));

    let token_request = transport.last_to("/token").unwrap();
    let query: Vec<(String, String)> = token_request
        .url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(
        query,
        vec![
            ("service".to_string(), "registry.test".to_string()),
            ("scope".to_string(), "repository:library/alpine:pull".to_string()),
        ]
    );
    // base64("alice:s3cret")
    assert_eq!(
        token_request.header("authorization").as_deref(),
        Some("Basic YWxpY2U6czNjcmV0")
    );
}

#[tokio::test]
async fn test_identity_token_is_sent_as_bearer() {
    let transport = token_registry(r#"{"token":"t-1"}"#);
    let auth = auth_service(transport.clone());
    let endpoint = RegistryEndpoint::https(HOST).with_credentials(Credentials::identity_token("refresh-xyz"));

    auth.get_auth_header(&endpoint, "library/alpine", SCOPE).await.unwrap();

    let token_request = transport.last_to("/token").unwrap();
    assert_eq!(token_request.header("authorization").as_deref(), Some("Bearer refresh-xyz"));
}

#[tokio::test]
async fn test_token_with_overflowing_lifetime_is_cached() {
    let transport = token_registry(r#"{"token":"t","expires_in":18446744073709551615}"#);
    let auth = auth_service(transport.clone());

    let first = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    let second = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();

    assert_eq!(first.as_deref(), Some("Bearer t"));
    assert_eq!(second, first);
    assert_eq!(transport.count(HttpMethod::Get, "/token"), 1);
}

#[tokio::test]
async fn test_different_credentials_do_not_share_tokens() {
    let transport = token_registry(r#"{"token":"t-1","expires_in":300}"#);
    let auth = auth_service(transport.clone());
    let alice = RegistryEndpoint::https(HOST).with_credentials(Credentials::basic("alice", "a"));
    let bob = RegistryEndpoint::https(HOST).with_credentials(Credentials::basic("bob", "b"));

    auth.get_auth_header(&alice, "library/alpine", SCOPE).await.unwrap();
    auth.get_auth_header(&bob, "library/alpine", SCOPE).await.unwrap();

    assert_eq!(transport.count(HttpMethod::Get, "/token"), 2);
}

#[tokio::test]
async fn test_expired_token_is_refetched() {
    let transport = token_registry(r#"{"token":"short-lived","expires_in":1}"#);
    let auth = auth_service(transport.clone());

    auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();

    assert_eq!(transport.count(HttpMethod::Get, "/token"), 2);
    assert_eq!(transport.count(HttpMethod::Head, "/v2/"), 2);
}

#[tokio::test]
async fn test_ttl_from_token_response_header() {
    let fetches = Arc::new(AtomicUsize::new(0));
    let seen = fetches.clone();
    let transport = ScriptedTransport::new(move |request| match request.url.host_str() {
        Some("auth.test") => {
            seen.fetch_add(1, Ordering::SeqCst);
            reply(200, &[("docker-token-expires-in", "1")], r#"{"token":"t"}"#)
        }
        _ => empty(401, &[("www-authenticate", CHALLENGE)]),
    });
    let auth = auth_service(transport);

    auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    assert_eq!(fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unexpected_ping_status() {
    let transport = ScriptedTransport::new(|_| empty(500, &[]));
    let auth = auth_service(transport);

    let err = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::UnexpectedPingStatus));
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_missing_challenge() {
    let transport = ScriptedTransport::new(|_| empty(401, &[("www-authenticate", r#"Basic realm="registry""#)]));
    let auth = auth_service(transport);

    let err = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::MissingChallenge));
}

#[tokio::test]
async fn test_bearer_challenge_found_among_several_headers() {
    let transport = ScriptedTransport::new(|request| match request.url.host_str() {
        Some("auth.test") => reply(200, &[], r#"{"token":"t-2"}"#),
        _ => empty(
            401,
            &[
                ("www-authenticate", r#"Basic realm="registry""#),
                ("www-authenticate", CHALLENGE),
            ],
        ),
    });
    let auth = auth_service(transport);

    let header = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap();
    assert_eq!(header.as_deref(), Some("Bearer t-2"));
}

#[tokio::test]
async fn test_token_endpoint_failure() {
    let transport = ScriptedTransport::new(|request| match request.url.host_str() {
        Some("auth.test") => empty(403, &[]),
        _ => empty(401, &[("www-authenticate", CHALLENGE)]),
    });
    let auth = auth_service(transport);

    let err = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::TokenFailed));
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn test_token_endpoint_garbage_body() {
    let transport = token_registry("<html>not json</html>");
    let auth = auth_service(transport);

    let err = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::TokenFailed));
}

#[tokio::test]
async fn test_token_response_without_token() {
    let transport = token_registry(r#"{"expires_in":60}"#);
    let auth = auth_service(transport);

    let err = auth.get_auth_header(&endpoint(), "library/alpine", SCOPE).await.unwrap_err();

    assert_eq!(err.auth_kind(), Some(AuthErrorKind::NoToken));
}
