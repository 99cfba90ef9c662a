//! `pkgbundle states` - Compute lifecycle states for bundle manifests.
//!
//! Loads the given bundles into an in-process store next to a bundle
//! controller naming `--active`, then evaluates each bundle the way the
//! operator would on a cluster running `--server`.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use pkgbundle_core::config::{DEFAULT_CONTROLLER_NAME, DEFAULT_NAMESPACE};
use pkgbundle_core::trust::PUBLIC_KEY_ENV;
use pkgbundle_core::{
    Bundle, BundleController, BundleStore, LifecycleManager, MemoryStore, OperatorConfig,
    StaticServerVersion,
};

use crate::cli::helpers::read_input;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct StatesArgs {
    /// Bundle manifest files (YAML)
    #[arg(required = true)]
    pub bundles: Vec<PathBuf>,

    /// Cluster Kubernetes version, e.g. `1.21`
    #[arg(long)]
    pub server: String,

    /// Name of the cluster's active bundle
    #[arg(long, default_value = "")]
    pub active: String,

    /// Base64 PKIX public key replacing the default trust domain key
    #[arg(long, env = PUBLIC_KEY_ENV)]
    pub public_key: Option<String>,

    /// Reserved namespace
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,
}

pub async fn cmd_states(args: StatesArgs) -> i32 {
    match run_states(args).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_codes::INPUT_ERROR
        }
    }
}

async fn run_states(args: StatesArgs) -> Result<()> {
    let mut config = OperatorConfig::default().with_namespace(args.namespace.clone());
    if let Some(key) = &args.public_key {
        config = config.with_public_key(key.clone());
    }

    let store = Arc::new(MemoryStore::new(&config));
    let mut controller = BundleController::new(&args.namespace, DEFAULT_CONTROLLER_NAME);
    controller.spec.active_bundle = args.active.clone();
    store.put_controller(&controller).await;

    let mut bundles = Vec::with_capacity(args.bundles.len());
    for path in &args.bundles {
        let content = read_input(path)?;
        let mut bundle: Bundle = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse bundle: {}", path.display()))?;
        if bundle.metadata.namespace.is_empty() {
            bundle.metadata.namespace = args.namespace.clone();
        }
        let stored = store
            .create_bundle(&bundle)
            .await
            .with_context(|| format!("duplicate bundle: {}", path.display()))?;
        debug!(path = %path.display(), bundle = %stored.name(), "loaded bundle");
        bundles.push(stored);
    }

    let versions = StaticServerVersion::parse(&args.server)
        .with_context(|| format!("invalid --server version: {}", args.server))?;
    let manager = LifecycleManager::new(config, store, Arc::new(versions));

    println!("{:<24} {:<24} STATE", "NAMESPACE", "NAME");
    for bundle in &bundles {
        let state = manager.compute(bundle).await?;
        println!("{:<24} {:<24} {}", bundle.namespace(), bundle.name(), state);
    }
    Ok(())
}
