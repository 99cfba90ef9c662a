//! Resource documents persisted by the cluster store.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// API version of every document in this crate.
pub const API_VERSION: &str = "packages.eks.amazonaws.com/v1alpha1";

/// Kind of a [`Bundle`] document.
pub const BUNDLE_KIND: &str = "PackageBundle";

/// Kind of a [`BundleController`] document.
pub const BUNDLE_CONTROLLER_KIND: &str = "PackageBundleController";

/// Default OCI registry hosting bundles.
pub const DEFAULT_BUNDLE_REGISTRY: &str = "public.ecr.aws/eks-anywhere";

/// Default repository for bundles within the registry.
pub const DEFAULT_BUNDLE_REPOSITORY: &str = "eks-anywhere-packages-bundles";

/// Poll cadence when the last check succeeded.
pub const DEFAULT_UPGRADE_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Poll cadence after a failed check.
pub const DEFAULT_UPGRADE_CHECK_SHORT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Object metadata, limited to the fields this system reads or excludes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Server-assigned; always excluded from digests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_fields: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Optimistic-concurrency token maintained by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }
}

/// One immutable, signed set of installable packages for a Kubernetes minor
/// version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_bundle_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: BundleSpec,

    #[serde(default, skip_serializing_if = "BundleStatus::is_empty")]
    pub status: BundleStatus,
}

impl Bundle {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_bundle_kind(),
            metadata: ObjectMeta::new(namespace, name),
            spec: BundleSpec::default(),
            status: BundleStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    /// Stored lifecycle state, if one was ever assigned.
    pub fn state(&self) -> Option<BundleState> {
        self.status.state
    }
}

/// Packages supported by a bundle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSpec {
    #[serde(default)]
    pub packages: Vec<BundlePackage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundlePackage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    pub source: BundlePackageSource,
}

/// Location of a package (usually a helm chart) and its published versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundlePackageSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub registry: String,

    pub repository: String,

    #[serde(default)]
    pub versions: Vec<SourceVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceVersion {
    /// Human-friendly version, e.g. "v1.0".
    pub name: String,

    /// Checksum identifying the version and its contents.
    pub digest: String,

    /// Base64-encoded, gzipped JSON schema for package configuration.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<VersionImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionImage {
    pub repository: String,
    pub digest: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<BundleState>,
}

impl BundleStatus {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
    }
}

/// Derived lifecycle state of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BundleState {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "inactive")]
    Inactive,
    #[serde(rename = "upgrade available")]
    UpgradeAvailable,
    #[serde(rename = "ignored")]
    Ignored,
    #[serde(rename = "ignored version")]
    IgnoredVersion,
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "invalid version")]
    InvalidVersion,
    /// Any value written by a newer or foreign schema.
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl std::fmt::Display for BundleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::UpgradeAvailable => "upgrade available",
            Self::Ignored => "ignored",
            Self::IgnoredVersion => "ignored version",
            Self::Invalid => "invalid",
            Self::InvalidVersion => "invalid version",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Per-cluster record of which bundle is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleController {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_controller_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: BundleControllerSpec,

    #[serde(default)]
    pub status: BundleControllerStatus,
}

impl BundleController {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_controller_kind(),
            metadata: ObjectMeta::new(namespace, name),
            spec: BundleControllerSpec::default(),
            status: BundleControllerStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleControllerSpec {
    /// Name of the bundle packages are sourced from.
    #[serde(default)]
    pub active_bundle: String,

    #[serde(default)]
    pub source: BundleControllerSource,

    #[serde(default, with = "duration_opt", skip_serializing_if = "Option::is_none")]
    pub upgrade_check_interval: Option<Duration>,

    #[serde(default, with = "duration_opt", skip_serializing_if = "Option::is_none")]
    pub upgrade_check_short_interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<i32>,
}

impl BundleControllerSpec {
    pub fn upgrade_check_interval(&self) -> Duration {
        self.upgrade_check_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_UPGRADE_CHECK_INTERVAL)
    }

    pub fn upgrade_check_short_interval(&self) -> Duration {
        self.upgrade_check_short_interval
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_UPGRADE_CHECK_SHORT_INTERVAL)
    }
}

/// Registry location bundle manifests are pulled from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleControllerSource {
    pub registry: String,
    pub repository: String,
}

impl Default for BundleControllerSource {
    fn default() -> Self {
        Self {
            registry: DEFAULT_BUNDLE_REGISTRY.to_string(),
            repository: DEFAULT_BUNDLE_REPOSITORY.to_string(),
        }
    }
}

impl BundleControllerSource {
    /// `registry/repository`, the reference a tag is appended to.
    pub fn base_ref(&self) -> String {
        format!(
            "{}/{}",
            self.registry.trim_end_matches('/'),
            self.repository.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleControllerStatus {
    #[serde(default)]
    pub state: ControllerState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// State of a bundle controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerState {
    /// Never reconciled.
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "upgrade available")]
    UpgradeAvailable,
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "ignored")]
    Ignored,
    #[serde(rename = "unknown", other)]
    Unknown,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unset => "",
            Self::Active => "active",
            Self::UpgradeAvailable => "upgrade available",
            Self::Disconnected => "disconnected",
            Self::Ignored => "ignored",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_bundle_kind() -> String {
    BUNDLE_KIND.to_string()
}

fn default_controller_kind() -> String {
    BUNDLE_CONTROLLER_KIND.to_string()
}

/// Human-readable durations ("24h", "1h 30m").
mod duration_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => humantime::parse_duration(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
