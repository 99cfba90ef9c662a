//! Trust domains for bundle signature verification.
//!
//! A trust domain pairs an annotation namespace (`<name>/signature`,
//! `<name>/excludes`) with the public key signatures under it must verify
//! against. The default domain ships with the production bundle key; the key
//! may be replaced per process via `PKGBUNDLE_PUBLIC_KEY`.

use p256::ecdsa::VerifyingKey;

use crate::canonicalize::{excludes_annotation, signature_annotation, SignatureResult};
use crate::keys::decode_public_key;

/// Annotation namespace of the default trust domain.
pub const DEFAULT_DOMAIN_NAME: &str = "eksa.aws.com";

/// Public key (base64 PKIX) of the default trust domain.
pub const DEFAULT_PUBLIC_KEY: &str = "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAEnP0Yo+ZxzPUEfohcG3bbJ8987UT4f0tj+XVBjS/s35wkfjrxTKrVZQpz3ta3zi5ZlgXzd7a20B1U1Py/TtPsxw==";

/// Environment variable overriding the default domain's public key.
pub const PUBLIC_KEY_ENV: &str = "PKGBUNDLE_PUBLIC_KEY";

/// A named verification context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDomain {
    pub name: String,
    /// Base64 PKIX-encoded P-256 public key.
    pub public_key: String,
}

impl Default for TrustDomain {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN_NAME, DEFAULT_PUBLIC_KEY)
    }
}

impl TrustDomain {
    pub fn new(name: impl Into<String>, public_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            public_key: public_key.into(),
        }
    }

    /// Default domain, with the key taken from `PKGBUNDLE_PUBLIC_KEY` when set.
    pub fn from_env() -> Self {
        Self::default().with_public_key_override(std::env::var(PUBLIC_KEY_ENV).ok())
    }

    /// Replace the key if `key` is set and non-blank.
    pub fn with_public_key_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) {
            tracing::debug!(domain = %self.name, "using overridden public key");
            self.public_key = key;
        }
        self
    }

    pub fn signature_annotation(&self) -> String {
        signature_annotation(&self.name)
    }

    pub fn excludes_annotation(&self) -> String {
        excludes_annotation(&self.name)
    }

    pub fn verifying_key(&self) -> SignatureResult<VerifyingKey> {
        decode_public_key(&self.public_key)
    }
}
