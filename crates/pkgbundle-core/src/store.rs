//! Persistence of bundle and bundle controller documents.
//!
//! Writes are conditional on `metadata.resourceVersion`: a write carrying a
//! version other than the stored one fails with [`BundleError::Conflict`],
//! which callers treat as transient. A write without a version is
//! unconditional.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::OperatorConfig;
use crate::error::{BundleError, BundleResult};
use crate::types::{Bundle, BundleController};
use crate::version::sort_bundles_descending;

/// Store operations used by the lifecycle and controller managers.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Bundles in the reserved namespace, newest first.
    async fn get_bundle_list(&self) -> BundleResult<Vec<Bundle>>;

    async fn get_bundle(&self, namespace: &str, name: &str) -> BundleResult<Option<Bundle>>;

    /// Create a bundle; fails if one with the same name exists.
    async fn create_bundle(&self, bundle: &Bundle) -> BundleResult<Bundle>;

    /// Replace a bundle's status, keeping the stored spec.
    async fn save_status(&self, bundle: &Bundle) -> BundleResult<Bundle>;

    async fn get_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> BundleResult<Option<BundleController>>;

    /// Replace a controller's metadata and spec, keeping the stored status.
    async fn save(&self, controller: &BundleController) -> BundleResult<BundleController>;

    /// Replace a controller's status, keeping the stored spec.
    async fn save_controller_status(
        &self,
        controller: &BundleController,
    ) -> BundleResult<BundleController>;

    /// Create a namespace if it does not exist.
    async fn ensure_namespace(&self, name: &str) -> BundleResult<()>;

    /// Whether `bundle` is the one named by the reserved controller.
    async fn is_active(&self, bundle: &Bundle) -> BundleResult<bool>;

    /// The bundle named by the reserved controller.
    async fn get_active_bundle(&self) -> BundleResult<Bundle>;
}

type Key = (String, String);

#[derive(Debug, Default)]
struct Inner {
    bundles: BTreeMap<Key, Bundle>,
    controllers: BTreeMap<Key, BundleController>,
    namespaces: BTreeSet<String>,
    revision: u64,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.revision += 1;
        self.revision.to_string()
    }
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore {
    namespace: String,
    controller_name: String,
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new(config: &OperatorConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            controller_name: config.controller_name.clone(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or replace a controller unconditionally.
    pub async fn put_controller(&self, controller: &BundleController) -> BundleController {
        let mut inner = self.inner.write().await;
        let mut stored = controller.clone();
        stored.metadata.resource_version = Some(inner.next_version());
        inner.controllers.insert(
            key(controller.namespace(), controller.name()),
            stored.clone(),
        );
        stored
    }

    pub async fn namespaces(&self) -> Vec<String> {
        self.inner.read().await.namespaces.iter().cloned().collect()
    }

    async fn reserved_controller(&self) -> BundleResult<BundleController> {
        self.get_controller(&self.namespace, &self.controller_name)
            .await?
            .ok_or_else(|| BundleError::NotFound {
                kind: "PackageBundleController",
                namespace: self.namespace.clone(),
                name: self.controller_name.clone(),
            })
    }
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn check_version(
    kind: &'static str,
    name: &str,
    stored: Option<&String>,
    incoming: Option<&String>,
) -> BundleResult<()> {
    match incoming {
        Some(expected) if stored != Some(expected) => Err(BundleError::Conflict {
            kind,
            name: name.to_string(),
            expected: expected.clone(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl BundleStore for MemoryStore {
    async fn get_bundle_list(&self) -> BundleResult<Vec<Bundle>> {
        let inner = self.inner.read().await;
        let mut bundles: Vec<Bundle> = inner
            .bundles
            .values()
            .filter(|b| b.namespace() == self.namespace)
            .cloned()
            .collect();
        sort_bundles_descending(&mut bundles);
        Ok(bundles)
    }

    async fn get_bundle(&self, namespace: &str, name: &str) -> BundleResult<Option<Bundle>> {
        Ok(self.inner.read().await.bundles.get(&key(namespace, name)).cloned())
    }

    async fn create_bundle(&self, bundle: &Bundle) -> BundleResult<Bundle> {
        let mut inner = self.inner.write().await;
        let k = key(bundle.namespace(), bundle.name());
        if inner.bundles.contains_key(&k) {
            return Err(BundleError::Conflict {
                kind: "PackageBundle",
                name: bundle.name().to_string(),
                expected: "absent".to_string(),
            });
        }
        let mut stored = bundle.clone();
        stored.metadata.resource_version = Some(inner.next_version());
        inner.bundles.insert(k, stored.clone());
        Ok(stored)
    }

    async fn save_status(&self, bundle: &Bundle) -> BundleResult<Bundle> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();
        let stored = inner
            .bundles
            .get_mut(&key(bundle.namespace(), bundle.name()))
            .ok_or_else(|| BundleError::NotFound {
                kind: "PackageBundle",
                namespace: bundle.namespace().to_string(),
                name: bundle.name().to_string(),
            })?;
        check_version(
            "PackageBundle",
            bundle.name(),
            stored.metadata.resource_version.as_ref(),
            bundle.metadata.resource_version.as_ref(),
        )?;
        stored.status = bundle.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn get_controller(
        &self,
        namespace: &str,
        name: &str,
    ) -> BundleResult<Option<BundleController>> {
        Ok(self
            .inner
            .read()
            .await
            .controllers
            .get(&key(namespace, name))
            .cloned())
    }

    async fn save(&self, controller: &BundleController) -> BundleResult<BundleController> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();
        let stored = inner
            .controllers
            .get_mut(&key(controller.namespace(), controller.name()))
            .ok_or_else(|| BundleError::NotFound {
                kind: "PackageBundleController",
                namespace: controller.namespace().to_string(),
                name: controller.name().to_string(),
            })?;
        check_version(
            "PackageBundleController",
            controller.name(),
            stored.metadata.resource_version.as_ref(),
            controller.metadata.resource_version.as_ref(),
        )?;
        let status = std::mem::take(&mut stored.status);
        *stored = controller.clone();
        stored.status = status;
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn save_controller_status(
        &self,
        controller: &BundleController,
    ) -> BundleResult<BundleController> {
        let mut inner = self.inner.write().await;
        let version = inner.next_version();
        let stored = inner
            .controllers
            .get_mut(&key(controller.namespace(), controller.name()))
            .ok_or_else(|| BundleError::NotFound {
                kind: "PackageBundleController",
                namespace: controller.namespace().to_string(),
                name: controller.name().to_string(),
            })?;
        check_version(
            "PackageBundleController",
            controller.name(),
            stored.metadata.resource_version.as_ref(),
            controller.metadata.resource_version.as_ref(),
        )?;
        stored.status = controller.status.clone();
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn ensure_namespace(&self, name: &str) -> BundleResult<()> {
        self.inner.write().await.namespaces.insert(name.to_string());
        Ok(())
    }

    async fn is_active(&self, bundle: &Bundle) -> BundleResult<bool> {
        let controller = self.reserved_controller().await?;
        Ok(bundle.namespace() == self.namespace && bundle.name() == controller.spec.active_bundle)
    }

    async fn get_active_bundle(&self) -> BundleResult<Bundle> {
        let controller = self.reserved_controller().await?;
        let name = controller.spec.active_bundle;
        self.get_bundle(&self.namespace, &name)
            .await?
            .ok_or_else(|| BundleError::NotFound {
                kind: "PackageBundle",
                namespace: self.namespace.clone(),
                name,
            })
    }
}
