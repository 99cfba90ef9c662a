//! Cluster server version lookups.

use async_trait::async_trait;

use crate::error::BundleResult;
use crate::version::ServerVersion;

/// Resolves the Kubernetes version of a managed cluster.
#[async_trait]
pub trait ServerVersionSource: Send + Sync {
    async fn server_version(&self, cluster: &str) -> BundleResult<ServerVersion>;
}

/// Reports the same version for every cluster.
#[derive(Debug, Clone)]
pub struct StaticServerVersion {
    version: ServerVersion,
}

impl StaticServerVersion {
    pub fn new(version: ServerVersion) -> Self {
        Self { version }
    }

    /// From a `<major>.<minor>` string such as `"1.21"`.
    pub fn parse(version: &str) -> BundleResult<Self> {
        ServerVersion::parse(version).map(Self::new)
    }
}

#[async_trait]
impl ServerVersionSource for StaticServerVersion {
    async fn server_version(&self, _cluster: &str) -> BundleResult<ServerVersion> {
        Ok(self.version.clone())
    }
}
