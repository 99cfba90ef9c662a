//! Bundle lifecycle states.
//!
//! A bundle's state is re-derived from scratch on every reconciliation:
//!
//! | Situation | State |
//! |---|---|
//! | namespace is not the reserved namespace | `Ignored` |
//! | name is not `v<major>-<minor>-<sequence>` | `InvalidVersion` |
//! | major/minor differ from the cluster's | `IgnoredVersion` |
//! | signature does not verify under the trust domain | `Invalid` |
//! | active, and a same-minor bundle with a greater sequence exists | `UpgradeAvailable` |
//! | active | `Active` |
//! | anything else | `Inactive` |

use std::sync::Arc;

use tracing::{debug, info};

use crate::cluster::ServerVersionSource;
use crate::config::OperatorConfig;
use crate::error::BundleResult;
use crate::store::BundleStore;
use crate::trust::TrustDomain;
use crate::types::{Bundle, BundleState};
use crate::verify::verify;
use crate::version::{BundleVersion, ServerVersion};

/// Everything a bundle's state depends on.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleContext<'a> {
    /// Reserved namespace.
    pub namespace: &'a str,
    pub server: &'a ServerVersion,
    pub domain: &'a TrustDomain,
    /// Whether the bundle is the cluster's active bundle.
    pub is_active: bool,
    /// Bundles in the reserved namespace.
    pub bundles: &'a [Bundle],
}

/// Derive the state of `bundle`.
pub fn evaluate_state(bundle: &Bundle, ctx: &LifecycleContext<'_>) -> BundleState {
    if bundle.namespace() != ctx.namespace {
        return BundleState::Ignored;
    }
    let Some(version) = BundleVersion::parse(bundle.name()) else {
        return BundleState::InvalidVersion;
    };
    if !ctx.server.matches(&version) {
        return BundleState::IgnoredVersion;
    }
    if !signature_valid(bundle, ctx.domain) {
        return BundleState::Invalid;
    }
    if !ctx.is_active {
        return BundleState::Inactive;
    }
    if newer_bundle(&version, ctx).is_some() {
        BundleState::UpgradeAvailable
    } else {
        BundleState::Active
    }
}

fn signature_valid(bundle: &Bundle, domain: &TrustDomain) -> bool {
    match verify(bundle, domain) {
        Ok(outcome) => {
            if !outcome.valid {
                info!(
                    bundle = %bundle.name(),
                    digest = %outcome.digest.to_base64(),
                    "signature is invalid for the configured public key"
                );
            }
            outcome.valid
        }
        Err(e) => {
            info!(bundle = %bundle.name(), error = %e, "bundle failed verification");
            false
        }
    }
}

/// Name of a bundle in the reserved namespace for the same minor version
/// with a greater sequence, if any.
fn newer_bundle<'a>(version: &BundleVersion, ctx: &LifecycleContext<'a>) -> Option<&'a str> {
    ctx.bundles
        .iter()
        .filter(|b| b.namespace() == ctx.namespace)
        .filter_map(|b| Some((b.name(), BundleVersion::parse(b.name())?)))
        .filter(|(_, v)| v.same_minor(version) && v.sequence > version.sequence)
        .max_by_key(|(_, v)| v.sequence)
        .map(|(name, _)| name)
}

/// Result of reconciling one bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleUpdate {
    pub state: BundleState,
    /// False when the stored state already matched and nothing was written.
    pub changed: bool,
}

/// Assigns bundle states and persists them.
pub struct LifecycleManager {
    config: OperatorConfig,
    domain: TrustDomain,
    store: Arc<dyn BundleStore>,
    versions: Arc<dyn ServerVersionSource>,
}

impl LifecycleManager {
    pub fn new(
        config: OperatorConfig,
        store: Arc<dyn BundleStore>,
        versions: Arc<dyn ServerVersionSource>,
    ) -> Self {
        let domain = config.trust_domain();
        Self {
            config,
            domain,
            store,
            versions,
        }
    }

    pub fn with_trust_domain(mut self, domain: TrustDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Compute `bundle`'s state without writing it.
    pub async fn compute(&self, bundle: &Bundle) -> BundleResult<BundleState> {
        // States that need no cluster lookups.
        if bundle.namespace() != self.config.namespace {
            return Ok(BundleState::Ignored);
        }
        if !bundle.is_valid_version() {
            return Ok(BundleState::InvalidVersion);
        }

        let server = self
            .versions
            .server_version(&self.config.controller_name)
            .await?;
        let is_active = self.store.is_active(bundle).await?;
        let bundles = self.store.get_bundle_list().await?;

        Ok(evaluate_state(
            bundle,
            &LifecycleContext {
                namespace: &self.config.namespace,
                server: &server,
                domain: &self.domain,
                is_active,
                bundles: &bundles,
            },
        ))
    }

    /// Recompute `bundle`'s state and persist it if it changed.
    ///
    /// On a write, `bundle` is replaced with the stored document.
    pub async fn reconcile(&self, bundle: &mut Bundle) -> BundleResult<LifecycleUpdate> {
        let state = self.compute(bundle).await?;
        if bundle.state() == Some(state) {
            debug!(bundle = %bundle.name(), state = %state, "bundle state unchanged");
            return Ok(LifecycleUpdate {
                state,
                changed: false,
            });
        }

        info!(
            bundle = %bundle.name(),
            from = ?bundle.state(),
            to = %state,
            "bundle state changed"
        );
        bundle.status.state = Some(state);
        *bundle = self.store.save_status(bundle).await?;
        Ok(LifecycleUpdate {
            state,
            changed: true,
        })
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.config)
            .field("domain", &self.domain.name)
            .finish_non_exhaustive()
    }
}
