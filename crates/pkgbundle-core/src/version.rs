//! Bundle names and Kubernetes server versions.
//!
//! Bundle names have the form `v<major>-<minor>-<sequence>`, e.g.
//! `v1-21-1003`: `major.minor` pins the Kubernetes minor version the bundle
//! targets and `sequence` orders bundles published for that minor version.

use std::cmp::Ordering;

use crate::error::{BundleError, BundleResult};
use crate::types::Bundle;

/// Parsed components of a bundle name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BundleVersion {
    pub major: u32,
    pub minor: u32,
    pub sequence: u64,
}

impl BundleVersion {
    /// Parse `v<major>-<minor>-<sequence>`; any other shape yields `None`.
    ///
    /// ```
    /// use pkgbundle_core::BundleVersion;
    ///
    /// let v = BundleVersion::parse("v1-21-1003").unwrap();
    /// assert_eq!((v.major, v.minor, v.sequence), (1, 21, 1003));
    /// assert!(BundleVersion::parse("v1-21-x").is_none());
    /// assert!(BundleVersion::parse("kevin-morby").is_none());
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix('v')?;
        let mut parts = rest.split('-');
        let major = parse_digits(parts.next()?)?;
        let minor = parse_digits(parts.next()?)?;
        let sequence = parse_digits(parts.next()?)?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major: u32::try_from(major).ok()?,
            minor: u32::try_from(minor).ok()?,
            sequence,
        })
    }

    /// `v<major>-<minor>`, the form compared against a cluster's version.
    pub fn kube_version(&self) -> String {
        format_kube_version(self.major, self.minor)
    }

    /// Whether both bundles target the same Kubernetes minor version.
    pub fn same_minor(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl std::fmt::Display for BundleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}-{}-{}", self.major, self.minor, self.sequence)
    }
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse a bundle name, failing with [`BundleError::InvalidName`].
pub fn parse_bundle_name(name: &str) -> BundleResult<BundleVersion> {
    BundleVersion::parse(name).ok_or_else(|| BundleError::InvalidName {
        name: name.to_string(),
    })
}

/// `v{major}-{minor}`.
pub fn format_kube_version(major: u32, minor: u32) -> String {
    format!("v{}-{}", major, minor)
}

/// Kubernetes server version as reported by the cluster's API server.
///
/// Non-GA minors are reported with a trailing `+` (e.g. `"21+"`); it is
/// stripped before any comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: String,
    pub minor: String,
}

impl ServerVersion {
    pub fn new(major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
        }
    }

    /// Parse `<major>.<minor>[.<patch>]`, with an optional leading `v`.
    pub fn parse(version: &str) -> BundleResult<Self> {
        let trimmed = version.trim().trim_start_matches('v');
        let mut parts = trimmed.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) if !major.is_empty() && !minor.is_empty() => {
                Ok(Self::new(major, minor))
            }
            _ => Err(BundleError::ServerVersion {
                message: format!(
                    "kube version should be in <major>.<minor> format, got {:?}",
                    version
                ),
            }),
        }
    }

    /// `v<major>-<minor>` with any `+` removed.
    pub fn kube_version(&self) -> String {
        format!("v{}-{}", self.major, self.minor).replace('+', "")
    }

    /// Whether a bundle version targets this server's major/minor.
    pub fn matches(&self, version: &BundleVersion) -> bool {
        self.kube_version() == version.kube_version()
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Order bundle names newest first.
///
/// Parsed names sort by major, minor, then sequence, all descending. Names
/// that fail to parse sort after every valid name and compare equal to each
/// other, so a stable sort keeps their original order.
pub fn compare_descending(a: &str, b: &str) -> Ordering {
    match (BundleVersion::parse(a), BundleVersion::parse(b)) {
        (Some(a), Some(b)) => (b.major, b.minor, b.sequence).cmp(&(a.major, a.minor, a.sequence)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort bundles newest first, in place (stable).
pub fn sort_bundles_descending(bundles: &mut [Bundle]) {
    bundles.sort_by(|a, b| compare_descending(a.name(), b.name()));
}
