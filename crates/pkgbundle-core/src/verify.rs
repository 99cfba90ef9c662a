//! Signature verification.
//!
//! A manifest is valid under a [`TrustDomain`] when its `<domain>/signature`
//! annotation is an ASN.1 DER ECDSA-P256 signature, over the canonical digest
//! (see [`crate::canonicalize`]), made by the domain's key.
//!
//! An invalid signature is a negative result, not an error: callers get
//! `Ok(VerifyOutcome { valid: false, .. })` and must reject on it.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::Signature;
use serde::Serialize;
use serde_json::Value;

use crate::canonicalize::{
    annotation, compute_digest, parse_manifest, to_document, CanonicalDigest, SignatureError,
    SignatureResult,
};
use crate::trust::TrustDomain;

/// Result of a completed verification.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub digest: CanonicalDigest,
}

/// Verify a generic manifest document.
pub fn verify_manifest(manifest: &Value, domain: &TrustDomain) -> SignatureResult<VerifyOutcome> {
    let signature_b64 = annotation(manifest, &domain.signature_annotation())
        .ok_or(SignatureError::MissingSignature)?;

    let digest = compute_digest(manifest, &domain.name)?;

    let signature_der =
        BASE64
            .decode(signature_b64.trim())
            .map_err(|e| SignatureError::SignatureNotBase64 {
                message: e.to_string(),
            })?;
    let key = domain.verifying_key()?;

    let valid = match Signature::from_der(&signature_der) {
        Ok(signature) => key.verify_prehash(&digest.digest, &signature).is_ok(),
        Err(e) => {
            tracing::debug!(error = %e, "signature is not ASN.1 DER");
            false
        }
    };

    tracing::debug!(domain = %domain.name, digest = %digest.hex(), valid, "verified manifest");
    Ok(VerifyOutcome { valid, digest })
}

/// Verify any serializable manifest, such as a [`crate::Bundle`].
pub fn verify<T: Serialize>(manifest: &T, domain: &TrustDomain) -> SignatureResult<VerifyOutcome> {
    verify_manifest(&to_document(manifest)?, domain)
}

/// Verify a YAML manifest.
pub fn verify_yaml(content: &str, domain: &TrustDomain) -> SignatureResult<VerifyOutcome> {
    verify_manifest(&parse_manifest(content)?, domain)
}
