//! Bundle controller state machine.
//!
//! Each tick resolves the cluster's Kubernetes version, pulls the latest
//! bundle for it, registers that bundle if it is new, then advances the
//! controller's state:
//!
//! | State | Transition |
//! |---|---|
//! | unset | adopt the latest bundle if none is active, then `Active` |
//! | `Active` | `UpgradeAvailable` when the latest bundle is not the active one |
//! | `UpgradeAvailable` | `Active` once the active bundle is the latest |
//! | `Disconnected` | `Active` |
//!
//! A failed version lookup or pull moves an unset or `Active` controller to
//! `Disconnected` and requeues after the short interval.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cluster::ServerVersionSource;
use crate::config::OperatorConfig;
use crate::error::{BundleError, BundleResult};
use crate::registry::RegistryClient;
use crate::store::BundleStore;
use crate::types::{Bundle, BundleController, ControllerState};

/// When to reconcile a controller next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `None` means never requeue.
    pub requeue_after: Option<Duration>,
}

impl ReconcileOutcome {
    pub fn after(interval: Duration) -> Self {
        Self {
            requeue_after: Some(interval),
        }
    }

    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }
}

/// Drives [`BundleController`] documents.
pub struct BundleControllerManager {
    config: OperatorConfig,
    store: Arc<dyn BundleStore>,
    registry: RegistryClient,
    versions: Arc<dyn ServerVersionSource>,
}

impl BundleControllerManager {
    pub fn new(
        config: OperatorConfig,
        store: Arc<dyn BundleStore>,
        registry: RegistryClient,
        versions: Arc<dyn ServerVersionSource>,
    ) -> Self {
        Self {
            config,
            store,
            registry,
            versions,
        }
    }

    /// Whether the controller is the one this operator manages.
    pub fn is_managed(&self, controller: &BundleController) -> bool {
        controller.name() == self.config.controller_name
            && controller.namespace() == self.config.namespace
    }

    /// Namespace packages for the controller's cluster are installed into.
    pub fn cluster_namespace(&self, controller: &BundleController) -> String {
        format!("{}-{}", self.config.namespace, controller.name())
    }

    /// Run one tick for `controller`.
    ///
    /// `controller` is updated in place with whatever was written. Transient
    /// failures (version lookup, pull, write conflicts) are logged or
    /// recorded in the status and answered with a short requeue instead of
    /// an error.
    pub async fn reconcile(
        &self,
        controller: &mut BundleController,
    ) -> BundleResult<ReconcileOutcome> {
        if !self.is_managed(controller) {
            if controller.status.state != ControllerState::Ignored {
                info!(
                    controller = %controller.name(),
                    namespace = %controller.namespace(),
                    "ignoring unmanaged bundle controller"
                );
                controller.status.state = ControllerState::Ignored;
                controller.status.detail.clear();
                *controller = self.store.save_controller_status(controller).await?;
            }
            return Ok(ReconcileOutcome::done());
        }

        let short = controller.spec.upgrade_check_short_interval();
        match self.reconcile_managed(controller).await {
            Err(e) if e.is_retryable() => {
                warn!(controller = %controller.name(), error = %e, "reconcile failed, will retry");
                Ok(ReconcileOutcome::after(short))
            }
            other => other,
        }
    }

    async fn reconcile_managed(
        &self,
        controller: &mut BundleController,
    ) -> BundleResult<ReconcileOutcome> {
        let short = controller.spec.upgrade_check_short_interval();

        let server = match self.versions.server_version(controller.name()).await {
            Ok(server) => server,
            Err(e) => {
                self.disconnect(controller, &e).await?;
                return Ok(ReconcileOutcome::after(short));
            }
        };

        let base_ref = controller.spec.source.base_ref();
        let mut latest = match self.registry.latest_bundle(&base_ref, &server).await {
            Ok(bundle) => bundle,
            Err(e) => {
                self.disconnect(controller, &e).await?;
                return Ok(ReconcileOutcome::after(short));
            }
        };
        latest.metadata.namespace = self.config.namespace.clone();

        let known = self.store.get_bundle_list().await?;
        if !known.iter().any(|b| b.name() == latest.name()) {
            info!(bundle = %latest.name(), "registering new bundle");
            self.store.create_bundle(&latest).await?;
        }

        let original = controller.clone();
        match controller.status.state {
            ControllerState::Active => {
                self.store
                    .ensure_namespace(&self.cluster_namespace(controller))
                    .await?;
                self.ensure_active_bundle(controller).await?;
                if latest.name() != controller.spec.active_bundle {
                    controller.status.state = ControllerState::UpgradeAvailable;
                    controller.status.detail = format!("{} available", latest.name());
                }
            }
            ControllerState::UpgradeAvailable => {
                if latest.name() == controller.spec.active_bundle {
                    controller.status.state = ControllerState::Active;
                    controller.status.detail.clear();
                }
            }
            ControllerState::Disconnected => {
                controller.status.state = ControllerState::Active;
                controller.status.detail.clear();
            }
            ControllerState::Unset | ControllerState::Unknown => {
                if controller.status.state == ControllerState::Unknown {
                    warn!(controller = %controller.name(), "unknown controller state, starting over");
                }
                if controller.spec.active_bundle.is_empty() {
                    info!(bundle = %latest.name(), "adopting latest bundle");
                    controller.spec.active_bundle = latest.name().to_string();
                    let status = controller.status.clone();
                    *controller = self.store.save(controller).await?;
                    controller.status = status;
                }
                controller.status.state = ControllerState::Active;
                controller.status.detail.clear();
            }
            ControllerState::Ignored => {
                // Managed again after being ignored.
                controller.status.state = ControllerState::Active;
                controller.status.detail.clear();
            }
        }

        self.save_status_if_changed(&original, controller).await?;
        Ok(ReconcileOutcome::after(controller.spec.upgrade_check_interval()))
    }

    /// Recreate the active bundle if it is missing from the store.
    async fn ensure_active_bundle(&self, controller: &BundleController) -> BundleResult<()> {
        let name = &controller.spec.active_bundle;
        if name.is_empty() {
            return Ok(());
        }
        match self.store.get_active_bundle().await {
            Ok(_) => Ok(()),
            Err(BundleError::NotFound { .. }) => {
                let reference = format!("{}:{}", controller.spec.source.base_ref(), name);
                info!(bundle = %name, reference = %reference, "recreating missing active bundle");
                let mut bundle: Bundle = self.registry.download_bundle(&reference).await?;
                bundle.metadata.namespace = self.config.namespace.clone();
                bundle.metadata.name = name.clone();
                self.store.create_bundle(&bundle).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn disconnect(
        &self,
        controller: &mut BundleController,
        error: &BundleError,
    ) -> BundleResult<()> {
        warn!(controller = %controller.name(), error = %error, "bundle source unreachable");
        if !matches!(
            controller.status.state,
            ControllerState::Active | ControllerState::Unset
        ) {
            return Ok(());
        }
        let original = controller.clone();
        controller.status.state = ControllerState::Disconnected;
        controller.status.detail = error.to_string();
        self.save_status_if_changed(&original, controller).await
    }

    async fn save_status_if_changed(
        &self,
        original: &BundleController,
        controller: &mut BundleController,
    ) -> BundleResult<()> {
        if original.status == controller.status {
            debug!(controller = %controller.name(), state = %controller.status.state, "no status change");
            return Ok(());
        }
        info!(
            controller = %controller.name(),
            from = %original.status.state,
            to = %controller.status.state,
            detail = %controller.status.detail,
            "bundle controller state changed"
        );
        *controller = self.store.save_controller_status(controller).await?;
        Ok(())
    }
}

impl std::fmt::Debug for BundleControllerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleControllerManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
