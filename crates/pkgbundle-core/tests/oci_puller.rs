//! Integration tests for OciPuller.
//!
//! Uses wiremock to stand in for an OCI distribution registry.

use pkgbundle_core::registry::RegistryClient;
use pkgbundle_core::{BundleError, OciPuller, Puller, PullerConfig};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUNDLE_YAML: &str = "apiVersion: packages.eks.amazonaws.com/v1alpha1
kind: PackageBundle
metadata:
  name: v1-21-1003
  namespace: eksa-packages
spec:
  packages:
  - name: hello-eks-anywhere
    source:
      repository: hello-eks-anywhere
      versions:
      - name: 0.1.0
        digest: sha256:eaa07ae1c06ffb563fe3c16cdb317f7ac31c8f829d5f1f32442f0e5ab982c3e7
";

fn blob_digest(content: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())))
}

fn manifest(layers: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
            "size": 2
        },
        "layers": layers
    })
}

fn bundle_layer(digest: &str) -> serde_json::Value {
    serde_json::json!({
        "mediaType": "application/vnd.oci.image.layer.v1.tar",
        "digest": digest,
        "size": BUNDLE_YAML.len(),
        "annotations": { "org.opencontainers.image.title": "bundle.yaml" }
    })
}

fn reference(server: &MockServer, tag: &str) -> String {
    format!(
        "{}/eks-anywhere/bundles:{}",
        server.uri().trim_start_matches("http://"),
        tag
    )
}

fn puller(max_retries: u32) -> OciPuller {
    let config = PullerConfig::default()
        .with_insecure(true)
        .with_max_retries(max_retries);
    OciPuller::new(config).expect("failed to create puller")
}

async fn mount_manifest(server: &MockServer, tag: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/eks-anywhere/bundles/manifests/{tag}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_blob(server: &MockServer, digest: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/eks-anywhere/bundles/blobs/{digest}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_pull_bundle_layer() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);

    mount_manifest(
        &server,
        "v1-21-latest",
        manifest(serde_json::json!([bundle_layer(&digest)])),
    )
    .await;
    mount_blob(&server, &digest, BUNDLE_YAML).await;

    let pulled = puller(0)
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .expect("pull failed");
    assert_eq!(pulled, BUNDLE_YAML.as_bytes());
}

#[tokio::test]
async fn test_registry_client_decodes_pulled_bundle() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);

    mount_manifest(
        &server,
        "v1-21-1003",
        manifest(serde_json::json!([bundle_layer(&digest)])),
    )
    .await;
    mount_blob(&server, &digest, BUNDLE_YAML).await;

    let client = RegistryClient::new(Arc::new(puller(0)));
    let bundle = client
        .download_bundle(&reference(&server, "v1-21-1003"))
        .await
        .expect("download failed");
    assert_eq!(bundle.name(), "v1-21-1003");
    assert_eq!(bundle.spec.packages[0].name, "hello-eks-anywhere");
}

#[tokio::test]
async fn test_titled_layer_wins_over_others() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);
    let other = serde_json::json!({
        "mediaType": "application/vnd.oci.image.layer.v1.tar",
        "digest": blob_digest("README"),
        "size": 6,
        "annotations": { "org.opencontainers.image.title": "README.md" }
    });

    mount_manifest(
        &server,
        "v1-21-latest",
        manifest(serde_json::json!([other, bundle_layer(&digest)])),
    )
    .await;
    mount_blob(&server, &digest, BUNDLE_YAML).await;

    let pulled = puller(0)
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .expect("pull failed");
    assert_eq!(pulled, BUNDLE_YAML.as_bytes());
}

#[tokio::test]
async fn test_digest_mismatch_is_rejected() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);

    mount_manifest(
        &server,
        "v1-21-latest",
        manifest(serde_json::json!([bundle_layer(&digest)])),
    )
    .await;
    mount_blob(&server, &digest, "tampered: true\n").await;

    let err = puller(0)
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("digest mismatch"), "got: {err}");
}

#[tokio::test]
async fn test_missing_manifest_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/eks-anywhere/bundles/manifests/v1-99-latest"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = puller(3)
        .pull(&reference(&server, "v1-99-latest"))
        .await
        .unwrap_err();
    assert!(matches!(err, BundleError::Registry { .. }));
    assert!(err.to_string().ends_with("not found"));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);

    Mock::given(method("GET"))
        .and(path("/v2/eks-anywhere/bundles/manifests/v1-21-latest"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_manifest(
        &server,
        "v1-21-latest",
        manifest(serde_json::json!([bundle_layer(&digest)])),
    )
    .await;
    mount_blob(&server, &digest, BUNDLE_YAML).await;

    let pulled = puller(1)
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .expect("pull should succeed after retry");
    assert_eq!(pulled, BUNDLE_YAML.as_bytes());
}

#[tokio::test]
async fn test_token_is_sent() {
    let server = MockServer::start().await;
    let digest = blob_digest(BUNDLE_YAML);

    Mock::given(method("GET"))
        .and(path("/v2/eks-anywhere/bundles/manifests/v1-21-latest"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(manifest(serde_json::json!([bundle_layer(&digest)]))),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_blob(&server, &digest, BUNDLE_YAML).await;

    let config = PullerConfig::default()
        .with_insecure(true)
        .with_max_retries(0)
        .with_token("secret-token");
    let puller = OciPuller::new(config).expect("failed to create puller");
    puller
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .expect("pull failed");
}

#[tokio::test]
async fn test_unauthorized_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/eks-anywhere/bundles/manifests/v1-21-latest"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = puller(3)
        .pull(&reference(&server, "v1-21-latest"))
        .await
        .unwrap_err();
    assert!(err.to_string().ends_with("unauthorized"));
}
