//! Admission decisions for bundle and bundle controller writes.
//!
//! Only the decision logic lives here; the webhook transport calling it is
//! someone else's concern.

use serde::Serialize;
use tracing::info;

use crate::canonicalize::to_document;
use crate::trust::TrustDomain;
use crate::types::{Bundle, BundleController};
use crate::verify::verify_manifest;
use crate::version::{BundleVersion, ServerVersion};

/// Verdict for one admission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    /// HTTP-style status code (200 when allowed).
    pub code: u16,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl AdmissionDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            code: 200,
            reason: String::new(),
        }
    }

    pub fn deny(code: u16, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            code,
            reason: reason.into(),
        }
    }
}

/// Admit a bundle only if its name parses and its signature verifies.
pub fn validate_bundle<T: Serialize>(bundle: &T, domain: &TrustDomain) -> AdmissionDecision {
    let document = match to_document(bundle) {
        Ok(document) => document,
        Err(e) => return AdmissionDecision::deny(400, e.to_string()),
    };
    let name = document
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .unwrap_or_default()
        .to_string();

    let denial = |err: String| {
        AdmissionDecision::deny(
            400,
            format!("package {} failed validation with error: {}", name, err),
        )
    };

    if BundleVersion::parse(&name).is_none() {
        let message = format!(
            "Invalid bundle name (should be in the format vx-xx-xxxx where x is a digit): {}",
            name
        );
        info!(bundle = %name, "{}", message);
        return denial(message);
    }

    match verify_manifest(&document, domain) {
        Ok(outcome) if outcome.valid => AdmissionDecision::allow(),
        Ok(outcome) => {
            info!(
                bundle = %name,
                digest = %outcome.digest.to_base64(),
                manifest = %outcome.digest.yaml_str(),
                "invalid signature"
            );
            denial(format!(
                "The signature is invalid for the configured public key: {}",
                domain.public_key
            ))
        }
        Err(e) => denial(e.to_string()),
    }
}

/// Admit a controller only if its active bundle exists and targets the
/// cluster's Kubernetes version.
pub fn validate_active_bundle(
    controller: &BundleController,
    bundles: &[Bundle],
    server: &ServerVersion,
) -> AdmissionDecision {
    let name = &controller.spec.active_bundle;
    let Some(bundle) = bundles.iter().find(|b| b.name() == name) else {
        return AdmissionDecision::deny(
            404,
            format!("package bundle not found with name: {:?}", name),
        );
    };
    match bundle.version() {
        Ok(version) if server.matches(&version) => AdmissionDecision::allow(),
        Ok(version) => AdmissionDecision::deny(
            400,
            format!(
                "package bundle {} is for kubernetes {}, cluster is running {}",
                name,
                version.kube_version(),
                server.kube_version()
            ),
        ),
        Err(e) => AdmissionDecision::deny(400, e.to_string()),
    }
}
