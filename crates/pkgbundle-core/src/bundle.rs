//! Lookups over bundle documents.

use std::collections::BTreeSet;
use std::io::Read;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::read::GzDecoder;

use crate::error::{BundleError, BundleResult};
use crate::types::{Bundle, BundlePackage, BundlePackageSource, SourceVersion};
use crate::version::{parse_bundle_name, BundleVersion, ServerVersion};

/// Version selector that resolves to the first listed version.
pub const LATEST: &str = "latest";

/// Where to fetch one version of a package chart from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOciSource {
    pub registry: String,
    pub repository: String,
    pub digest: String,
    pub version: String,
}

impl PackageOciSource {
    pub fn chart_uri(&self) -> String {
        format!(
            "oci://{}/{}",
            self.registry.trim_end_matches('/'),
            self.repository.trim_start_matches('/')
        )
    }
}

impl Bundle {
    /// Find a package by name, ignoring ASCII case.
    pub fn find_package(&self, name: &str) -> BundleResult<&BundlePackage> {
        self.spec
            .packages
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| BundleError::PackageNotFound {
                bundle: self.name().to_string(),
                package: name.to_string(),
            })
    }

    /// Find a version of `package` by name, digest, or [`LATEST`].
    ///
    /// `latest` is the first version listed; bundles order their versions
    /// with the preferred one first.
    pub fn find_version<'a>(
        &self,
        package: &'a BundlePackage,
        version: &str,
    ) -> BundleResult<&'a SourceVersion> {
        package
            .source
            .versions
            .iter()
            .find(|v| version == LATEST || v.name == version || v.digest == version)
            .ok_or_else(|| BundleError::VersionNotFound {
                bundle: self.name().to_string(),
                package: package.name.clone(),
                version: version.to_string(),
            })
    }

    /// Resolve a package name and version to its OCI location.
    pub fn oci_source(&self, package: &str, version: &str) -> BundleResult<PackageOciSource> {
        let pkg = self.find_package(package)?;
        let found = self.find_version(pkg, version)?;
        Ok(PackageOciSource {
            registry: pkg.source.registry.clone(),
            repository: pkg.source.repository.clone(),
            digest: found.digest.clone(),
            version: found.name.clone(),
        })
    }

    /// Parsed bundle name.
    pub fn version(&self) -> BundleResult<BundleVersion> {
        parse_bundle_name(self.name())
    }

    pub fn is_valid_version(&self) -> bool {
        BundleVersion::parse(self.name()).is_some()
    }

    /// Whether the bundle targets the cluster's major/minor version.
    pub fn kube_version_matches(&self, server: &ServerVersion) -> BundleResult<bool> {
        Ok(server.matches(&self.version()?))
    }
}

impl BundlePackageSource {
    /// Same location and the same set of `(name, digest)` versions.
    pub fn package_matches(&self, other: &BundlePackageSource) -> bool {
        fn keys(source: &BundlePackageSource) -> BTreeSet<(&str, &str)> {
            source
                .versions
                .iter()
                .map(|v| (v.name.as_str(), v.digest.as_str()))
                .collect()
        }

        self.registry == other.registry
            && self.repository == other.repository
            && keys(self) == keys(other)
    }
}

impl SourceVersion {
    /// The configuration JSON schema, stored base64-encoded and gzipped.
    pub fn json_schema(&self) -> BundleResult<Vec<u8>> {
        let compressed = BASE64
            .decode(self.schema.trim())
            .map_err(|e| BundleError::Schema {
                message: e.to_string(),
            })?;
        let mut schema = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut schema)
            .map_err(|e| BundleError::Schema {
                message: format!("uncompressing: {}", e),
            })?;
        Ok(schema)
    }
}
