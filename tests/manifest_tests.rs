mod common;

use common::{client_with, empty, fast_config, manifest_json, reply, ScriptedTransport};
use docker_image_puller::error::{RegistryError, ValidationErrorKind};
use docker_image_puller::image::{Descriptor, Digest, ManifestIndex, MediaType, Platform};
use docker_image_puller::registry::transport::HttpMethod;

const REPO: &str = "library/alpine";

fn index_json(entries: Vec<(Digest, &str, &str)>) -> Vec<u8> {
    let index = ManifestIndex {
        schema_version: 2,
        media_type: Some(MediaType::OciIndex.as_str().to_string()),
        manifests: entries
            .into_iter()
            .map(|(digest, os, arch)| {
                let mut entry = Descriptor::new(MediaType::OciManifest.as_str(), digest, 512);
                entry.platform = Some(Platform {
                    architecture: arch.to_string(),
                    os: os.to_string(),
                    variant: None,
                    os_version: None,
                });
                entry
            })
            .collect(),
    };
    serde_json::to_vec(&index).unwrap()
}

#[tokio::test]
async fn test_fetch_manifest_verifies_header_digest() {
    let (body, manifest) = manifest_json(b"config", &[b"layer-1", b"layer-2"]);
    let digest = Digest::sha256_of(&body).to_string();
    let response_body = body.clone();
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(
            200,
            &[
                ("content-type", MediaType::OciManifest.as_str()),
                ("docker-content-digest", digest.as_str()),
            ],
            response_body.clone(),
        ),
    });
    let client = client_with(transport.clone(), fast_config());

    let result = client.fetch_manifest(REPO, "3.19").await.unwrap();

    assert_eq!(result.digest, Digest::sha256_of(&body));
    assert_eq!(result.media_type, MediaType::OciManifest.as_str());
    assert_eq!(result.content_length, body.len() as u64);
    assert_eq!(result.manifest, Some(manifest));

    let request = transport.last_to("/v2/library/alpine/manifests/3.19").unwrap();
    let accept = request.header("accept").unwrap();
    for media_type in MediaType::MANIFEST_ACCEPT {
        assert!(accept.contains(media_type.as_str()));
    }
}

#[tokio::test]
async fn test_fetch_manifest_digest_header_mismatch() {
    let (body, _) = manifest_json(b"config", &[b"layer"]);
    let wrong = Digest::sha256_of(b"something else").to_string();
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[("docker-content-digest", wrong.as_str())], body.clone()),
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DigestMismatch));
}

#[tokio::test]
async fn test_fetch_by_digest_checks_reference() {
    let (body, _) = manifest_json(b"config", &[b"layer"]);
    let requested = Digest::sha256_of(b"a different manifest");
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[], body.clone()),
    });
    let client = client_with(transport, fast_config());

    let err = client
        .fetch_manifest(REPO, &requested.to_string())
        .await
        .unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DigestMismatch));
}

#[tokio::test]
async fn test_media_type_falls_back_to_payload() {
    let (body, _) = manifest_json(b"config", &[b"layer"]);
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[], body.clone()),
    });
    let client = client_with(transport, fast_config());

    let result = client.fetch_manifest(REPO, "latest").await.unwrap();

    assert_eq!(result.media_type, MediaType::OciManifest.as_str());
}

#[tokio::test]
async fn test_index_resolves_to_linux_amd64() {
    let (amd_body, amd_manifest) = manifest_json(b"amd-config", &[b"amd-layer"]);
    let amd_digest = Digest::sha256_of(&amd_body);
    let arm_digest = Digest::sha256_of(b"arm manifest");
    let index = index_json(vec![
        (arm_digest.clone(), "linux", "arm64"),
        (amd_digest.clone(), "linux", "amd64"),
    ]);
    let amd_path = format!("/v2/{}/manifests/{}", REPO, amd_digest);
    let arm_path = format!("/v2/{}/manifests/{}", REPO, arm_digest);
    let (index_path, served_amd) = (amd_path.clone(), amd_body.clone());
    let transport = ScriptedTransport::new(move |request| {
        let path = request.url.path();
        if path == "/v2/" {
            empty(200, &[])
        } else if path == index_path {
            reply(200, &[("content-type", MediaType::OciManifest.as_str())], served_amd.clone())
        } else if path.ends_with("/manifests/latest") {
            reply(200, &[("content-type", MediaType::OciIndex.as_str())], index.clone())
        } else {
            empty(404, &[])
        }
    });
    let client = client_with(transport.clone(), fast_config());

    let result = client.fetch_manifest(REPO, "latest").await.unwrap();

    assert_eq!(result.digest, amd_digest);
    assert_eq!(result.manifest, Some(amd_manifest));
    assert_eq!(transport.count(HttpMethod::Get, &amd_path), 1);
    assert_eq!(transport.count(HttpMethod::Get, &arm_path), 0);
}

#[tokio::test]
async fn test_index_detected_by_body_without_content_type() {
    let (body, _) = manifest_json(b"only-config", &[b"only-layer"]);
    let digest = Digest::sha256_of(&body);
    let index = index_json(vec![(digest.clone(), "windows", "amd64")]);
    let target = format!("/v2/{}/manifests/{}", REPO, digest);
    let transport = ScriptedTransport::new(move |request| {
        let path = request.url.path();
        if path == "/v2/" {
            empty(200, &[])
        } else if path == target {
            reply(200, &[], body.clone())
        } else {
            reply(200, &[], index.clone())
        }
    });
    let client = client_with(transport, fast_config());

    let result = client.fetch_manifest(REPO, "latest").await.unwrap();

    assert_eq!(result.digest, digest);
}

#[tokio::test]
async fn test_empty_index_is_rejected() {
    let index = index_json(vec![]);
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[("content-type", MediaType::DockerManifestList.as_str())], index.clone()),
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::EmptyManifestList));
}

#[tokio::test]
async fn test_nested_index_chain_stops() {
    // Five indices, each pointing at the next by digest
    let mut bodies = vec![index_json(vec![(Digest::sha256_of(b"leaf"), "linux", "amd64")])];
    for _ in 0..4 {
        let next = Digest::sha256_of(&bodies[0]);
        bodies.insert(0, index_json(vec![(next, "linux", "amd64")]));
    }
    let transport = ScriptedTransport::new(move |request| {
        let path = request.url.path();
        if path == "/v2/" {
            return empty(200, &[]);
        }
        let body = if path.ends_with("/manifests/latest") {
            Some(&bodies[0])
        } else {
            bodies
                .iter()
                .find(|body| path.ends_with(&Digest::sha256_of(body).to_string()))
        };
        match body {
            Some(body) => reply(200, &[("content-type", MediaType::OciIndex.as_str())], body.clone()),
            None => empty(404, &[]),
        }
    });
    let client = client_with(transport.clone(), fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::NestedIndex));
    let manifest_gets = transport
        .requests()
        .iter()
        .filter(|r| r.method == HttpMethod::Get && r.url.path().contains("/manifests/"))
        .count();
    assert_eq!(manifest_gets, 5);
}

#[tokio::test]
async fn test_index_pinned_by_digest_must_match() {
    let (body, _) = manifest_json(b"config", &[b"layer"]);
    let tampered = index_json(vec![(Digest::sha256_of(&body), "linux", "amd64")]);
    let pinned = Digest::sha256_of(b"the index that was published");
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[("content-type", MediaType::OciIndex.as_str())], tampered.clone()),
    });
    let client = client_with(transport.clone(), fast_config());

    let err = client
        .fetch_manifest(REPO, &pinned.to_string())
        .await
        .unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DigestMismatch));
    assert_eq!(
        transport
            .requests()
            .iter()
            .filter(|r| r.url.path().contains("/manifests/"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_index_digest_header_mismatch() {
    let (body, _) = manifest_json(b"config", &[b"layer"]);
    let index = index_json(vec![(Digest::sha256_of(&body), "linux", "amd64")]);
    let wrong = Digest::sha256_of(b"not this index").to_string();
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(
            200,
            &[
                ("content-type", MediaType::OciIndex.as_str()),
                ("docker-content-digest", wrong.as_str()),
            ],
            index.clone(),
        ),
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DigestMismatch));
}

#[tokio::test]
async fn test_index_entry_body_must_match_its_digest() {
    let (real, _) = manifest_json(b"config", &[b"layer"]);
    let (swapped, _) = manifest_json(b"other-config", &[b"other-layer"]);
    let index = index_json(vec![(Digest::sha256_of(&real), "linux", "amd64")]);
    let transport = ScriptedTransport::new(move |request| {
        let path = request.url.path();
        if path == "/v2/" {
            empty(200, &[])
        } else if path.ends_with("/manifests/latest") {
            reply(200, &[("content-type", MediaType::OciIndex.as_str())], index.clone())
        } else {
            reply(200, &[("content-type", MediaType::OciManifest.as_str())], swapped.clone())
        }
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::DigestMismatch));
}

#[tokio::test]
async fn test_manifest_not_found() {
    let transport = ScriptedTransport::new(|request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => empty(404, &[]),
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "missing").await.unwrap_err();

    assert!(matches!(err, RegistryError::Http { status: 404, .. }), "{err}");
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let transport = ScriptedTransport::new(|request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        _ => reply(200, &[("content-type", MediaType::DockerManifest.as_str())], "{not json"),
    });
    let client = client_with(transport, fast_config());

    let err = client.fetch_manifest(REPO, "latest").await.unwrap_err();

    assert!(matches!(err, RegistryError::Parse(_)), "{err}");
}

#[tokio::test]
async fn test_head_manifest() {
    let digest = Digest::sha256_of(b"head");
    let header_digest = digest.to_string();
    let transport = ScriptedTransport::new(move |request| match request.url.path() {
        "/v2/" => empty(200, &[]),
        "/v2/library/alpine/manifests/gone" => empty(404, &[]),
        "/v2/library/alpine/manifests/bare" => empty(200, &[("content-length", "10")]),
        _ => empty(
            200,
            &[
                ("docker-content-digest", header_digest.as_str()),
                ("content-length", "1234"),
                ("content-type", MediaType::DockerManifest.as_str()),
            ],
        ),
    });
    let client = client_with(transport, fast_config());

    let found = client.head_manifest(REPO, "3.19").await.unwrap().unwrap();
    assert_eq!(found.digest, digest);
    assert_eq!(found.content_length, 1234);
    assert_eq!(found.media_type, MediaType::DockerManifest.as_str());
    assert_eq!(found.manifest, None);

    assert_eq!(client.head_manifest(REPO, "gone").await.unwrap(), None);

    let err = client.head_manifest(REPO, "bare").await.unwrap_err();
    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::MissingHeader));
}

#[tokio::test]
async fn test_invalid_reference_is_rejected_before_network() {
    let transport = ScriptedTransport::new(|_| empty(200, &[]));
    let client = client_with(transport.clone(), fast_config());

    let err = client.fetch_manifest(REPO, "bad tag").await.unwrap_err();

    assert_eq!(err.validation_kind(), Some(ValidationErrorKind::InvalidReference));
    assert!(transport.requests().is_empty());
}
