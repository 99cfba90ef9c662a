//! Trust and lifecycle management for signed package bundles.
//!
//! A package bundle is a versioned manifest listing the packages a
//! Kubernetes cluster may install. This crate provides:
//!
//! - Bundle name parsing and ordering (`v<major>-<minor>-<sequence>`)
//! - A canonical digest over manifests, with signer-declared exclusions
//! - ECDSA P-256 signing and verification under a trust domain
//! - The bundle lifecycle state machine and the bundle controller manager
//! - An OCI registry puller and an in-process store
//! - Admission decisions for bundle and controller writes
//!
//! # Quick Start
//!
//! ```
//! use pkgbundle_core::{sign_yaml, verify_yaml, BundleVersion, KeyPair, TrustDomain};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let version = BundleVersion::parse("v1-21-1003").ok_or("bad name")?;
//! assert_eq!(version.kube_version(), "v1-21");
//!
//! let pair = KeyPair::generate();
//! let manifest = "metadata:\n  name: v1-21-1003\n  namespace: eksa-packages\n";
//! let signed = sign_yaml(manifest, &pair.private_key_pem()?, "eksa.aws.com")?;
//!
//! let domain = TrustDomain::new("eksa.aws.com", pair.public_key_base64()?);
//! let outcome = verify_yaml(std::str::from_utf8(&signed)?, &domain)?;
//! assert!(outcome.valid);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PKGBUNDLE_NAMESPACE` | Reserved namespace (default: `eksa-packages`) |
//! | `PKGBUNDLE_CONTROLLER_NAME` | Reserved controller name (default: `eksa-packages-bundle-controller`) |
//! | `PKGBUNDLE_PUBLIC_KEY` | Base64 PKIX public key replacing the default trust domain key |
//! | `PKGBUNDLE_REGISTRY_TOKEN` | Registry bearer token |
//! | `PKGBUNDLE_REGISTRY_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `PKGBUNDLE_REGISTRY_MAX_RETRIES` | Max retries for transient failures (default: 3) |
//! | `PKGBUNDLE_REGISTRY_INSECURE` | Pull over plain HTTP |

pub mod admission;
pub mod bundle;
pub mod canonicalize;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod keys;
pub mod lifecycle;
pub mod registry;
pub mod sign;
pub mod store;
pub mod trust;
pub mod types;
pub mod verify;
pub mod version;

// Re-export main types
pub use admission::{validate_active_bundle, validate_bundle, AdmissionDecision};
pub use bundle::PackageOciSource;
pub use cluster::{ServerVersionSource, StaticServerVersion};
pub use config::{OperatorConfig, PullerConfig};
pub use controller::{BundleControllerManager, ReconcileOutcome};
pub use error::{BundleError, BundleResult};
pub use keys::KeyPair;
pub use lifecycle::{evaluate_state, LifecycleContext, LifecycleManager, LifecycleUpdate};
pub use registry::{OciPuller, Puller, RegistryClient};
pub use sign::{sign, sign_manifest, sign_yaml, SignedManifest};
pub use store::{BundleStore, MemoryStore};
pub use trust::TrustDomain;
pub use types::{
    Bundle, BundleController, BundleControllerSource, BundleControllerSpec,
    BundleControllerStatus, BundlePackage, BundlePackageSource, BundleSpec, BundleState,
    BundleStatus, ControllerState, ObjectMeta, SourceVersion, VersionImage,
};
pub use verify::{verify, verify_manifest, verify_yaml, VerifyOutcome};
pub use version::{sort_bundles_descending, BundleVersion, ServerVersion};

// Canonical digest
pub use canonicalize::{
    compute_digest, CanonicalDigest, DocumentFilter, FieldPath, SignatureError, SignatureResult,
    ALWAYS_EXCLUDED,
};
