//! Canonical digests of Kubernetes manifests.
//!
//! A manifest's digest covers everything a signer vouches for and nothing
//! the API server assigns afterwards.
//!
//! # Process
//!
//! 1. Read `<domain>/excludes` from `metadata.annotations`: base64 of a
//!    newline-separated list of field-index selectors (see [`FieldPath`]).
//!    Empty lines are dropped; any other non-path selector is rejected.
//! 2. Union the excludes with [`ALWAYS_EXCLUDED`].
//! 3. Delete every excluded path (missing paths are skipped) and narrow
//!    `metadata.annotations` to `<domain>/includes` and `<domain>/excludes`.
//!    Signatures and annotations added by other tooling are not covered;
//!    the excludes annotation is, so rewriting it invalidates the signature.
//! 4. Render the result as YAML with sorted keys.
//! 5. SHA-256 the YAML bytes.
//!
//! An `annotations` map left empty by step 3 is removed, so a manifest
//! signed before it had any annotations verifies once the signature is added.

mod errors;
mod filter;
mod selector;
mod yaml;


pub use errors::{SignatureError, SignatureResult};
pub use filter::{DocumentFilter, ALWAYS_EXCLUDED};
pub use selector::{FieldPath, PathSegment};
pub use yaml::{parse_manifest, to_canonical_yaml};

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Annotation holding the base64 signature for `domain`.
pub fn signature_annotation(domain: &str) -> String {
    format!("{}/signature", domain)
}

/// Annotation holding the base64 excludes list for `domain`.
pub fn excludes_annotation(domain: &str) -> String {
    format!("{}/excludes", domain)
}

/// Annotation reserved for a base64 includes list under `domain`.
pub fn includes_annotation(domain: &str) -> String {
    format!("{}/includes", domain)
}

/// Digest of a manifest plus the canonical bytes it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalDigest {
    pub digest: [u8; 32],
    pub yaml: Vec<u8>,
}

impl CanonicalDigest {
    pub fn from_yaml(yaml: Vec<u8>) -> Self {
        Self {
            digest: sha256(&yaml),
            yaml,
        }
    }

    pub fn hex(&self) -> String {
        hex::encode(self.digest)
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.digest)
    }

    pub fn yaml_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.yaml)
    }
}

pub(crate) fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Convert any serializable manifest into a generic document.
pub fn to_document<T: Serialize>(manifest: &T) -> SignatureResult<Value> {
    let value = serde_json::to_value(manifest).map_err(SignatureError::document)?;
    if !value.is_object() {
        return Err(SignatureError::Document {
            message: "manifest must be a mapping".to_string(),
        });
    }
    Ok(value)
}

/// Read a string annotation from a generic document.
pub fn annotation<'a>(manifest: &'a Value, key: &str) -> Option<&'a str> {
    manifest
        .get("metadata")?
        .get("annotations")?
        .get(key)?
        .as_str()
}

/// Decode and validate the domain's excludes annotation.
pub fn read_excludes(manifest: &Value, domain: &str) -> SignatureResult<Vec<FieldPath>> {
    let Some(encoded) = annotation(manifest, &excludes_annotation(domain)) else {
        return Ok(Vec::new());
    };
    let decoded = BASE64
        .decode(encoded)
        .map_err(|e| SignatureError::ExcludesNotBase64 {
            message: e.to_string(),
        })?;
    let text = String::from_utf8(decoded).map_err(|e| SignatureError::ExcludesNotBase64 {
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    let mut invalid = Vec::new();
    for selector in text.split('\n').filter(|s| !s.is_empty()) {
        match FieldPath::parse(selector) {
            Some(path) => paths.push(path),
            None => invalid.push(selector.to_string()),
        }
    }
    if !invalid.is_empty() {
        return Err(SignatureError::InvalidSelector { selectors: invalid });
    }
    Ok(paths)
}

/// Encode selectors as an excludes annotation value.
pub fn encode_excludes<S: AsRef<str>>(selectors: &[S]) -> String {
    let joined = selectors
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    BASE64.encode(joined)
}

/// The filter whose output gets digested: excludes and [`ALWAYS_EXCLUDED`]
/// removed, annotations narrowed to the domain's includes and excludes.
pub fn signing_filter(manifest: &Value, domain: &str) -> SignatureResult<DocumentFilter> {
    Ok(DocumentFilter::always_excluded()
        .with_excludes(read_excludes(manifest, domain)?)
        .retaining_annotations([includes_annotation(domain), excludes_annotation(domain)]))
}

/// Compute the canonical digest of a manifest under `domain`.
pub fn compute_digest(manifest: &Value, domain: &str) -> SignatureResult<CanonicalDigest> {
    let filter = signing_filter(manifest, domain)?;
    let mut filtered = manifest.clone();
    filter.apply(&mut filtered);
    if !filtered.is_object() {
        tracing::error!(domain, "digest filter produced a non-mapping document");
        return Err(SignatureError::Internal {
            message: "filtered manifest is not a mapping".to_string(),
        });
    }
    Ok(CanonicalDigest::from_yaml(to_canonical_yaml(&filtered)?))
}
