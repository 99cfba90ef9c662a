//! Manifest signing.
//!
//! The signature covers the manifest as seen through the signing filter
//! (excludes and server-assigned fields removed, annotations narrowed to the
//! domain's includes and excludes),
//! while the exported document keeps the excludes annotation and everything
//! else a verifier needs to rebuild that same view.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::Signature;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::canonicalize::{
    compute_digest, parse_manifest, signature_annotation, to_canonical_yaml, to_document,
    CanonicalDigest, DocumentFilter, SignatureError, SignatureResult,
};
use crate::keys::parse_private_key;

/// A signed manifest ready for export.
#[derive(Debug, Clone)]
pub struct SignedManifest {
    /// The exported document, signature annotation included.
    pub document: Value,
    /// `document` rendered as canonical YAML.
    pub yaml: Vec<u8>,
    /// Base64 ASN.1 DER signature.
    pub signature: String,
    /// Digest the signature covers.
    pub digest: CanonicalDigest,
}

/// Sign a generic manifest with a PEM private key under `domain`.
pub fn sign_manifest(
    manifest: &Value,
    private_key_pem: &str,
    domain: &str,
) -> SignatureResult<SignedManifest> {
    let digest = compute_digest(manifest, domain)?;

    let key = parse_private_key(private_key_pem)?;
    let signature: Signature =
        key.sign_prehash(&digest.digest)
            .map_err(|e| SignatureError::Signing {
                message: e.to_string(),
            })?;
    let signature = BASE64.encode(signature.to_der().as_bytes());

    let mut document = manifest.clone();
    set_annotation(&mut document, &signature_annotation(domain), &signature)?;
    DocumentFilter::always_excluded().apply(&mut document);
    let yaml = to_canonical_yaml(&document)?;

    tracing::debug!(domain, digest = %digest.hex(), "signed manifest");
    Ok(SignedManifest {
        document,
        yaml,
        signature,
        digest,
    })
}

/// Sign any serializable manifest.
pub fn sign<T: Serialize>(
    manifest: &T,
    private_key_pem: &str,
    domain: &str,
) -> SignatureResult<SignedManifest> {
    sign_manifest(&to_document(manifest)?, private_key_pem, domain)
}

/// Sign a YAML manifest, returning the exported YAML.
pub fn sign_yaml(content: &str, private_key_pem: &str, domain: &str) -> SignatureResult<Vec<u8>> {
    Ok(sign_manifest(&parse_manifest(content)?, private_key_pem, domain)?.yaml)
}

/// Set `metadata.annotations[key]`, creating missing maps on the way.
pub fn set_annotation(manifest: &mut Value, key: &str, value: &str) -> SignatureResult<()> {
    let root = manifest
        .as_object_mut()
        .ok_or_else(|| SignatureError::document("manifest must be a mapping"))?;
    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if metadata.is_null() {
        *metadata = Value::Object(Map::new());
    }
    let metadata = metadata
        .as_object_mut()
        .ok_or_else(|| SignatureError::document("metadata must be a mapping"))?;
    let annotations = metadata
        .entry("annotations")
        .or_insert_with(|| Value::Object(Map::new()));
    if annotations.is_null() {
        *annotations = Value::Object(Map::new());
    }
    annotations
        .as_object_mut()
        .ok_or_else(|| SignatureError::document("annotations must be a mapping"))?
        .insert(key.to_string(), Value::String(value.to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize::encode_excludes;
    use crate::keys::KeyPair;
    use crate::trust::TrustDomain;
    use crate::verify::{verify_manifest, verify_yaml};
    use serde_json::json;

    const DOMAIN: &str = "eksa.aws.com";

    fn manifest() -> Value {
        json!({
            "apiVersion": "packages.eks.amazonaws.com/v1alpha1",
            "kind": "PackageBundle",
            "metadata": {
                "name": "v1-21-1003",
                "namespace": "eksa-packages",
                "uid": "2c9f0a44-7f43-4b1b-9a55-0f3d7f6c1e11",
                "resourceVersion": "981"
            },
            "spec": {"packages": [{
                "name": "harbor",
                "source": {
                    "registry": "public.ecr.aws/eks-anywhere",
                    "repository": "harbor/harbor-helm",
                    "versions": [{"name": "2.5.0", "digest": "sha256:abc"}]
                }
            }]},
            "status": {"state": "active"}
        })
    }

    fn keys() -> (String, TrustDomain) {
        let pair = KeyPair::generate();
        let domain = TrustDomain::new(DOMAIN, pair.public_key_base64().unwrap());
        (pair.private_key_pem().unwrap(), domain)
    }

    #[test]
    fn test_sign_then_verify() {
        let (pem, domain) = keys();
        let signed = sign_manifest(&manifest(), &pem, DOMAIN).unwrap();
        let outcome = verify_manifest(&signed.document, &domain).unwrap();
        assert!(outcome.valid);
        assert_eq!(outcome.digest, signed.digest);

        let from_yaml = verify_yaml(std::str::from_utf8(&signed.yaml).unwrap(), &domain).unwrap();
        assert!(from_yaml.valid);
    }

    #[test]
    fn test_export_drops_server_fields_only() {
        let (pem, _) = keys();
        let mut doc = manifest();
        doc["metadata"]["annotations"] =
            json!({"eksa.aws.com/excludes": encode_excludes(&[".spec.packages[0].source.registry"])});
        let signed = sign_manifest(&doc, &pem, DOMAIN).unwrap().document;

        assert!(signed.get("status").is_none());
        assert!(signed["metadata"].get("uid").is_none());
        assert!(signed["metadata"].get("resourceVersion").is_none());
        assert_eq!(
            signed["spec"]["packages"][0]["source"]["registry"],
            "public.ecr.aws/eks-anywhere"
        );
        let annotations = signed["metadata"]["annotations"].as_object().unwrap();
        assert!(annotations.contains_key("eksa.aws.com/excludes"));
        assert!(annotations.contains_key("eksa.aws.com/signature"));
    }

    #[test]
    fn test_excluded_fields_may_change_after_signing() {
        let (pem, domain) = keys();
        let mut doc = manifest();
        doc["metadata"]["annotations"] =
            json!({"eksa.aws.com/excludes": encode_excludes(&[".spec.packages[0].source.registry"])});
        let mut signed = sign_manifest(&doc, &pem, DOMAIN).unwrap().document;

        signed["spec"]["packages"][0]["source"]["registry"] = json!("mirror.example.com");
        signed["status"] = json!({"state": "inactive"});
        assert!(verify_manifest(&signed, &domain).unwrap().valid);
    }

    #[test]
    fn test_tampering_invalidates() {
        let (pem, domain) = keys();
        let mut signed = sign_manifest(&manifest(), &pem, DOMAIN).unwrap().document;
        signed["spec"]["packages"][0]["source"]["versions"][0]["digest"] = json!("sha256:evil");
        assert!(!verify_manifest(&signed, &domain).unwrap().valid);
    }

    #[test]
    fn test_annotations_added_after_signing_keep_signature() {
        let (pem, domain) = keys();
        let signed = sign_manifest(&manifest(), &pem, DOMAIN).unwrap().document;

        let mut applied = signed.clone();
        applied["metadata"]["annotations"]["kubectl.kubernetes.io/last-applied-configuration"] =
            json!("{}");
        assert!(verify_manifest(&applied, &domain).unwrap().valid);

        let mut cosigned = signed;
        cosigned["metadata"]["annotations"]["other.example.com/signature"] = json!("AAAA");
        assert!(verify_manifest(&cosigned, &domain).unwrap().valid);
    }

    #[test]
    fn test_rewriting_excludes_invalidates() {
        let (pem, domain) = keys();
        let mut doc = manifest();
        doc["metadata"]["annotations"] =
            json!({"eksa.aws.com/excludes": encode_excludes(&[".spec.packages[0].source.registry"])});
        let mut signed = sign_manifest(&doc, &pem, DOMAIN).unwrap().document;

        signed["metadata"]["annotations"]["eksa.aws.com/excludes"] =
            json!(encode_excludes(&[".spec.packages[0].source.registry", ".spec.packages[0].source.versions"]));
        signed["spec"]["packages"][0]["source"]["versions"][0]["digest"] = json!("sha256:evil");
        assert!(!verify_manifest(&signed, &domain).unwrap().valid);
    }

    #[test]
    fn test_resigning_replaces_signature() {
        let (pem, domain) = keys();
        let first = sign_manifest(&manifest(), &pem, DOMAIN).unwrap();
        let second = sign_manifest(&first.document, &pem, DOMAIN).unwrap();
        assert_eq!(first.digest, second.digest);
        assert!(verify_manifest(&second.document, &domain).unwrap().valid);
    }

    #[test]
    fn test_bad_private_key_is_fatal() {
        let err = sign_manifest(&manifest(), "not a key", DOMAIN).unwrap_err();
        assert!(matches!(err, SignatureError::PrivateKey { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_set_annotation_creates_maps() {
        let mut doc = json!({"kind": "ConfigMap"});
        set_annotation(&mut doc, "a/b", "c").unwrap();
        assert_eq!(doc["metadata"]["annotations"]["a/b"], "c");

        let mut doc = json!({"metadata": {"annotations": null}});
        set_annotation(&mut doc, "a/b", "c").unwrap();
        assert_eq!(doc["metadata"]["annotations"]["a/b"], "c");

        let mut doc = json!({"metadata": "nope"});
        assert!(set_annotation(&mut doc, "a/b", "c").is_err());
    }
}
