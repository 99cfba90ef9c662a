//! OCI artifact references.
//!
//! Supported forms:
//! - `public.ecr.aws/eks-anywhere/eks-anywhere-packages-bundles:v1-21-latest`
//! - `localhost:5000/bundles@sha256:0e8a...`
//! - `registry.example.com/bundles` (tag defaults to `latest`)

use std::fmt;

use crate::error::{BundleError, BundleResult};

/// Tag or digest part of a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Tag(String),
    Digest(String),
}

impl Selector {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag(t) => t,
            Self::Digest(d) => d,
        }
    }
}

/// A parsed `registry/repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub registry: String,
    pub repository: String,
    pub selector: Selector,
}

impl ArtifactRef {
    pub fn parse(reference: &str) -> BundleResult<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| BundleError::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let (registry, rest) = reference
            .split_once('/')
            .ok_or_else(|| invalid("missing repository"))?;
        if registry.is_empty() {
            return Err(invalid("missing registry"));
        }
        url::Url::parse(&format!("https://{}/", registry))
            .ok()
            .filter(|u| u.host_str().is_some() && u.path() == "/")
            .ok_or_else(|| invalid("invalid registry host"))?;

        let (repository, selector) = if let Some((repo, digest)) = rest.split_once('@') {
            if !digest.starts_with("sha256:") || digest.len() != 7 + 64 {
                return Err(invalid("digest must be sha256:<64 hex>"));
            }
            (repo, Selector::Digest(digest.to_string()))
        } else {
            match rest.rsplit_once(':') {
                Some((repo, tag)) if !tag.is_empty() && !tag.contains('/') => {
                    (repo, Selector::Tag(tag.to_string()))
                }
                Some(_) => return Err(invalid("empty tag")),
                None => (rest, Selector::Tag("latest".to_string())),
            }
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository path segment"));
        }

        Ok(Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            selector,
        })
    }

    fn base_url(&self, insecure: bool) -> String {
        let scheme = if insecure { "http" } else { "https" };
        format!("{}://{}/v2/{}", scheme, self.registry, self.repository)
    }

    /// Distribution API URL of this reference's manifest.
    pub fn manifest_url(&self, insecure: bool) -> String {
        format!("{}/manifests/{}", self.base_url(insecure), self.selector.as_str())
    }

    /// Distribution API URL of a blob in this reference's repository.
    pub fn blob_url(&self, digest: &str, insecure: bool) -> String {
        format!("{}/blobs/{}", self.base_url(insecure), digest)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.selector {
            Selector::Tag(t) => write!(f, "{}/{}:{}", self.registry, self.repository, t),
            Selector::Digest(d) => write!(f, "{}/{}@{}", self.registry, self.repository, d),
        }
    }
}
