//! Pulling bundle manifests from registries.
//!
//! [`RegistryClient`] knows how bundles are tagged; a [`Puller`] knows how to
//! fetch bytes for a reference. [`OciPuller`] implements the latter over the
//! OCI distribution API.

mod oci;
mod reference;

pub use oci::OciPuller;
pub use reference::{ArtifactRef, Selector};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BundleError, BundleResult};
use crate::types::Bundle;
use crate::version::ServerVersion;

/// Fetches the bytes of an artifact by reference.
#[async_trait]
pub trait Puller: Send + Sync {
    async fn pull(&self, reference: &str) -> BundleResult<Vec<u8>>;
}

/// `<base_ref>:v<major>-<minor>-latest`.
pub fn latest_ref(base_ref: &str, server: &ServerVersion) -> String {
    format!("{}:{}-latest", base_ref, server.kube_version())
}

/// Pulls and decodes bundle manifests.
#[derive(Clone)]
pub struct RegistryClient {
    puller: Arc<dyn Puller>,
}

impl RegistryClient {
    pub fn new(puller: Arc<dyn Puller>) -> Self {
        Self { puller }
    }

    /// The newest bundle published for the server's Kubernetes version.
    pub async fn latest_bundle(
        &self,
        base_ref: &str,
        server: &ServerVersion,
    ) -> BundleResult<Bundle> {
        self.download_bundle(&latest_ref(base_ref, server)).await
    }

    /// Pull and decode the bundle at `reference`.
    pub async fn download_bundle(&self, reference: &str) -> BundleResult<Bundle> {
        debug!(reference, "pulling package bundle");
        let data = self.puller.pull(reference).await?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(BundleError::EmptyArtifact {
                reference: reference.to_string(),
            });
        }
        serde_yaml::from_slice(&data).map_err(|e| BundleError::Decode {
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapPuller {
        artifacts: HashMap<String, Vec<u8>>,
        pulled: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Puller for MapPuller {
        async fn pull(&self, reference: &str) -> BundleResult<Vec<u8>> {
            self.pulled.lock().unwrap().push(reference.to_string());
            self.artifacts
                .get(reference)
                .cloned()
                .ok_or_else(|| BundleError::Registry {
                    reference: reference.to_string(),
                    message: "not found".to_string(),
                })
        }
    }

    fn client(artifacts: &[(&str, &str)]) -> (RegistryClient, Arc<MapPuller>) {
        let puller = Arc::new(MapPuller {
            artifacts: artifacts
                .iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
            ..MapPuller::default()
        });
        (RegistryClient::new(puller.clone()), puller)
    }

    #[tokio::test]
    async fn test_latest_bundle_uses_kube_version_tag() {
        let (client, puller) = client(&[(
            "example.com/bundles:v1-21-latest",
            "metadata:\n  name: v1-21-1003\n  namespace: eksa-packages\n",
        )]);
        let bundle = client
            .latest_bundle("example.com/bundles", &ServerVersion::new("1", "21+"))
            .await
            .unwrap();
        assert_eq!(bundle.name(), "v1-21-1003");
        assert_eq!(
            puller.pulled.lock().unwrap().as_slice(),
            ["example.com/bundles:v1-21-latest"]
        );
    }

    #[tokio::test]
    async fn test_empty_artifact_is_an_error() {
        let (client, _) = client(&[("example.com/bundles:v1", " \n")]);
        let err = client.download_bundle("example.com/bundles:v1").await.unwrap_err();
        assert!(matches!(err, BundleError::EmptyArtifact { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_artifact() {
        let (client, _) = client(&[("example.com/bundles:v1", "spec: [unterminated")]);
        let err = client.download_bundle("example.com/bundles:v1").await.unwrap_err();
        assert!(matches!(err, BundleError::Decode { .. }));
        assert!(err.to_string().starts_with("unmarshalling package bundle"));
    }

    #[tokio::test]
    async fn test_pull_errors_propagate() {
        let (client, _) = client(&[]);
        let err = client.download_bundle("example.com/bundles:v1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
