//! OCI distribution API puller.
//!
//! Status codes are interpreted here and nowhere else.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ArtifactRef, Puller};
use crate::config::PullerConfig;
use crate::error::{BundleError, BundleResult};

const USER_AGENT_VALUE: &str = concat!("pkgbundle/", env!("CARGO_PKG_VERSION"));

const MANIFEST_MEDIA_TYPES: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// Layer annotation naming the file a layer was pushed from.
const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// File name of the bundle layer.
const BUNDLE_LAYER_TITLE: &str = "bundle.yaml";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageManifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor {
    #[serde(default)]
    media_type: String,
    digest: String,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
}

/// Failed attempt, with whether another attempt may succeed.
struct Failure {
    error: BundleError,
    retryable: bool,
}

/// Pulls the `bundle.yaml` layer of an OCI artifact.
#[derive(Debug, Clone)]
pub struct OciPuller {
    client: reqwest::Client,
    config: PullerConfig,
}

impl OciPuller {
    pub fn new(config: PullerConfig) -> BundleResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(default_headers)
            .build()
            .map_err(|e| BundleError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> BundleResult<Self> {
        Self::new(PullerConfig::from_env())
    }

    async fn fetch_manifest(&self, artifact: &ArtifactRef) -> BundleResult<ImageManifest> {
        let url = artifact.manifest_url(self.config.insecure);
        debug!(url = %url, "fetching manifest");
        let body = self
            .get(&artifact.to_string(), &url, Some(MANIFEST_MEDIA_TYPES))
            .await?;
        serde_json::from_slice(&body).map_err(|e| BundleError::Registry {
            reference: artifact.to_string(),
            message: format!("invalid manifest: {}", e),
        })
    }

    /// GET with bounded, jittered retry of transient failures.
    async fn get(&self, reference: &str, url: &str, accept: Option<&str>) -> BundleResult<Vec<u8>> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            match self.get_once(reference, url, accept).await {
                Ok(body) => return Ok(body),
                Err(Failure {
                    error,
                    retryable: true,
                }) if retries < max_retries => {
                    retries += 1;

                    let base_backoff = Duration::from_secs(1 << retries.min(5)).min(Duration::from_secs(30));
                    let jittered_ms = rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %error,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying registry request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(Failure { error, .. }) => return Err(error),
            }
        }
    }

    async fn get_once(
        &self,
        reference: &str,
        url: &str,
        accept: Option<&str>,
    ) -> Result<Vec<u8>, Failure> {
        let registry_error = |message: String, retryable: bool| Failure {
            error: BundleError::Registry {
                reference: reference.to_string(),
                message,
            },
            retryable,
        };

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request
            .send()
            .await
            .map_err(|e| registry_error(e.to_string(), true))?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| registry_error(format!("failed to read response body: {}", e), true)),
            401 | 403 => Err(registry_error("unauthorized".to_string(), false)),
            404 => Err(registry_error("not found".to_string(), false)),
            429 | 500..=599 => Err(registry_error(format!("HTTP {}", status.as_u16()), true)),
            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(registry_error(
                    format!("HTTP {}: {}", status.as_u16(), message),
                    false,
                ))
            }
        }
    }
}

fn select_layer<'a>(reference: &str, layers: &'a [Descriptor]) -> BundleResult<&'a Descriptor> {
    if let Some(layer) = layers.iter().find(|l| {
        l.annotations
            .get(TITLE_ANNOTATION)
            .is_some_and(|t| t == BUNDLE_LAYER_TITLE)
    }) {
        return Ok(layer);
    }
    match layers {
        [only] => Ok(only),
        _ => Err(BundleError::Registry {
            reference: reference.to_string(),
            message: format!("no {} layer among {} layers", BUNDLE_LAYER_TITLE, layers.len()),
        }),
    }
}

#[async_trait]
impl Puller for OciPuller {
    async fn pull(&self, reference: &str) -> BundleResult<Vec<u8>> {
        let artifact = ArtifactRef::parse(reference)?;
        let manifest = self.fetch_manifest(&artifact).await?;
        let layer = select_layer(reference, &manifest.layers)?;
        debug!(
            reference,
            digest = %layer.digest,
            media_type = %layer.media_type,
            "fetching bundle layer"
        );

        let url = artifact.blob_url(&layer.digest, self.config.insecure);
        let blob = self.get(reference, &url, None).await?;

        let computed = format!("sha256:{}", hex::encode(crate::canonicalize::sha256(&blob)));
        if computed != layer.digest {
            return Err(BundleError::Registry {
                reference: reference.to_string(),
                message: format!("digest mismatch: expected {}, got {}", layer.digest, computed),
            });
        }
        Ok(blob)
    }
}
