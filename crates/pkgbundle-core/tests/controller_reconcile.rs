//! Integration tests for the bundle controller and lifecycle managers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pkgbundle_core::{
    sign, Bundle, BundleController, BundleControllerManager, BundleError, BundleResult,
    BundleState, BundleStore, ControllerState, KeyPair, LifecycleManager, MemoryStore,
    OperatorConfig, Puller, RegistryClient, ServerVersion, ServerVersionSource,
    StaticServerVersion, TrustDomain,
};

const NS: &str = "eksa-packages";
const CONTROLLER: &str = "eksa-packages-bundle-controller";
const BASE_REF: &str = "public.ecr.aws/eks-anywhere/eks-anywhere-packages-bundles";
const LATEST_REF: &str = "public.ecr.aws/eks-anywhere/eks-anywhere-packages-bundles:v1-21-latest";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Default)]
struct FakePuller {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    pulled: Mutex<Vec<String>>,
}

impl FakePuller {
    fn publish(&self, reference: &str, name: &str) {
        let yaml = serde_yaml::to_string(&Bundle::new("", name)).unwrap();
        self.artifacts
            .lock()
            .unwrap()
            .insert(reference.to_string(), yaml.into_bytes());
    }

    fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Puller for FakePuller {
    async fn pull(&self, reference: &str) -> BundleResult<Vec<u8>> {
        self.pulled.lock().unwrap().push(reference.to_string());
        self.artifacts
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| BundleError::Registry {
                reference: reference.to_string(),
                message: "not found".to_string(),
            })
    }
}

struct FakeVersions {
    result: Mutex<Result<ServerVersion, String>>,
}

impl FakeVersions {
    fn new() -> Self {
        Self {
            result: Mutex::new(Ok(ServerVersion::new("1", "21"))),
        }
    }

    fn fail(&self, message: &str) {
        *self.result.lock().unwrap() = Err(message.to_string());
    }

    fn recover(&self) {
        *self.result.lock().unwrap() = Ok(ServerVersion::new("1", "21"));
    }
}

#[async_trait]
impl ServerVersionSource for FakeVersions {
    async fn server_version(&self, _cluster: &str) -> BundleResult<ServerVersion> {
        self.result
            .lock()
            .unwrap()
            .clone()
            .map_err(|message| BundleError::ServerVersion { message })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    puller: Arc<FakePuller>,
    versions: Arc<FakeVersions>,
    manager: BundleControllerManager,
}

impl Harness {
    fn new() -> Self {
        let config = OperatorConfig::default();
        let store = Arc::new(MemoryStore::new(&config));
        let puller = Arc::new(FakePuller::default());
        let versions = Arc::new(FakeVersions::new());
        let manager = BundleControllerManager::new(
            config,
            store.clone(),
            RegistryClient::new(puller.clone()),
            versions.clone(),
        );
        Self {
            store,
            puller,
            versions,
            manager,
        }
    }

    async fn controller(&self, state: ControllerState, active: &str) -> BundleController {
        let mut controller = BundleController::new(NS, CONTROLLER);
        controller.spec.active_bundle = active.to_string();
        controller.status.state = state;
        self.store.put_controller(&controller).await
    }

    async fn stored_controller(&self) -> BundleController {
        self.store
            .get_controller(NS, CONTROLLER)
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn test_unset_controller_adopts_latest_bundle() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1003");
    let mut controller = h.controller(ControllerState::Unset, "").await;

    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(DAY));

    let stored = h.stored_controller().await;
    assert_eq!(stored.spec.active_bundle, "v1-21-1003");
    assert_eq!(stored.status.state, ControllerState::Active);
    assert_eq!(controller, stored);

    let bundle = h.store.get_bundle(NS, "v1-21-1003").await.unwrap();
    assert!(bundle.is_some(), "latest bundle should be registered");
}

#[tokio::test]
async fn test_active_controller_sees_upgrade() {
    let h = Harness::new();
    h.store
        .create_bundle(&Bundle::new(NS, "v1-21-1003"))
        .await
        .unwrap();
    h.puller.publish(LATEST_REF, "v1-21-1004");
    let mut controller = h.controller(ControllerState::Active, "v1-21-1003").await;

    h.manager.reconcile(&mut controller).await.unwrap();

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::UpgradeAvailable);
    assert_eq!(stored.status.detail, "v1-21-1004 available");
    assert_eq!(stored.spec.active_bundle, "v1-21-1003");
    assert!(h
        .store
        .namespaces()
        .await
        .contains(&"eksa-packages-eksa-packages-bundle-controller".to_string()));
}

#[tokio::test]
async fn test_upgrade_available_returns_to_active_once_upgraded() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1004");
    let mut controller = h
        .controller(ControllerState::UpgradeAvailable, "v1-21-1004")
        .await;

    h.manager.reconcile(&mut controller).await.unwrap();

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Active);
    assert!(stored.status.detail.is_empty());
}

#[tokio::test]
async fn test_server_failure_disconnects_then_recovers() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1003");
    let mut controller = h.controller(ControllerState::Active, "v1-21-1003").await;

    h.versions.fail("connection refused");
    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(HOUR));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Disconnected);
    assert_eq!(
        stored.status.detail,
        "getting server version: connection refused"
    );
    assert!(h.puller.pulled().is_empty());

    h.versions.recover();
    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(DAY));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Active);
    assert!(stored.status.detail.is_empty());
}

#[tokio::test]
async fn test_pull_failure_disconnects() {
    let h = Harness::new();
    let mut controller = h.controller(ControllerState::Active, "v1-21-1003").await;

    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(HOUR));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Disconnected);
    assert!(stored.status.detail.contains(LATEST_REF));
}

#[tokio::test]
async fn test_failure_keeps_upgrade_available_and_disconnected() {
    let h = Harness::new();
    let mut controller = h
        .controller(ControllerState::UpgradeAvailable, "v1-21-1003")
        .await;
    let before = controller.metadata.resource_version.clone();

    h.versions.fail("connection refused");
    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(HOUR));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::UpgradeAvailable);
    assert_eq!(stored.metadata.resource_version, before);

    let mut controller = BundleController::new(NS, CONTROLLER);
    controller.spec.active_bundle = "v1-21-1003".to_string();
    controller.status.state = ControllerState::Disconnected;
    controller.status.detail = "getting server version: timeout".to_string();
    let mut controller = h.store.put_controller(&controller).await;
    let before = controller.metadata.resource_version.clone();

    // Server is back but nothing is published, so the pull fails.
    h.versions.recover();
    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(HOUR));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Disconnected);
    assert_eq!(stored.status.detail, "getting server version: timeout");
    assert_eq!(stored.metadata.resource_version, before);
}

#[tokio::test]
async fn test_unset_controller_with_active_bundle_only_writes_status() {
    let h = Harness::new();
    h.store
        .create_bundle(&Bundle::new(NS, "v1-21-1004"))
        .await
        .unwrap();
    h.puller.publish(LATEST_REF, "v1-21-1004");
    let mut controller = h.controller(ControllerState::Unset, "v1-21-1003").await;
    let before: u64 = controller
        .metadata
        .resource_version
        .as_deref()
        .unwrap()
        .parse()
        .unwrap();

    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(DAY));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::Active);
    assert_eq!(stored.spec.active_bundle, "v1-21-1003");
    assert_eq!(
        stored.metadata.resource_version,
        Some((before + 1).to_string()),
        "only the status should be written"
    );
}

#[tokio::test]
async fn test_upgrade_available_stays_while_newer_bundle_exists() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1004");
    let mut controller = h
        .controller(ControllerState::UpgradeAvailable, "v1-21-1003")
        .await;
    let before = controller.metadata.resource_version.clone();

    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(DAY));

    let stored = h.stored_controller().await;
    assert_eq!(stored.status.state, ControllerState::UpgradeAvailable);
    assert_eq!(stored.spec.active_bundle, "v1-21-1003");
    assert_eq!(stored.metadata.resource_version, before);
}

#[tokio::test]
async fn test_unmanaged_controller_is_ignored_without_requeue() {
    let h = Harness::new();
    let controller = BundleController::new(NS, "some-other-controller");
    let mut controller = h.store.put_controller(&controller).await;

    let outcome = h.manager.reconcile(&mut controller).await.unwrap();
    assert_eq!(outcome.requeue_after, None);
    assert_eq!(controller.status.state, ControllerState::Ignored);

    let stored = h
        .store
        .get_controller(NS, "some-other-controller")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status.state, ControllerState::Ignored);
    assert!(h.puller.pulled().is_empty());
}

#[tokio::test]
async fn test_missing_active_bundle_is_recreated() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1004");
    h.puller
        .publish(&format!("{}:v1-21-1003", BASE_REF), "v1-21-1003");
    let mut controller = h.controller(ControllerState::Active, "v1-21-1003").await;

    h.manager.reconcile(&mut controller).await.unwrap();

    let recreated = h.store.get_bundle(NS, "v1-21-1003").await.unwrap();
    assert!(recreated.is_some(), "active bundle should be recreated");
    assert!(h
        .puller
        .pulled()
        .contains(&format!("{}:v1-21-1003", BASE_REF)));
    assert_eq!(
        h.stored_controller().await.status.state,
        ControllerState::UpgradeAvailable
    );
}

#[tokio::test]
async fn test_stale_controller_write_requeues() {
    let h = Harness::new();
    h.puller.publish(LATEST_REF, "v1-21-1003");
    let mut stale = h.controller(ControllerState::Unset, "").await;
    // Someone else writes in between.
    h.controller(ControllerState::Unset, "").await;

    let outcome = h.manager.reconcile(&mut stale).await.unwrap();
    assert_eq!(outcome.requeue_after, Some(HOUR));
    assert_eq!(h.stored_controller().await.spec.active_bundle, "");
}

#[tokio::test]
async fn test_unchanged_status_is_not_rewritten() {
    let h = Harness::new();
    h.store
        .create_bundle(&Bundle::new(NS, "v1-21-1003"))
        .await
        .unwrap();
    h.puller.publish(LATEST_REF, "v1-21-1003");
    let mut controller = h.controller(ControllerState::Active, "v1-21-1003").await;
    let before = controller.metadata.resource_version.clone();

    h.manager.reconcile(&mut controller).await.unwrap();

    assert_eq!(
        h.stored_controller().await.metadata.resource_version,
        before
    );
}

#[tokio::test]
async fn test_lifecycle_states_across_bundles() {
    let pair = KeyPair::generate();
    let domain = TrustDomain::new("eksa.aws.com", pair.public_key_base64().unwrap());
    let pem = pair.private_key_pem().unwrap();

    let config = OperatorConfig::default();
    let store = Arc::new(MemoryStore::new(&config));
    let mut controller = BundleController::new(NS, CONTROLLER);
    controller.spec.active_bundle = "v1-21-1003".to_string();
    store.put_controller(&controller).await;

    for (ns, name) in [
        (NS, "v1-21-1003"),
        (NS, "v1-21-1004"),
        (NS, "v1-20-1009"),
        ("default", "v1-21-1005"),
    ] {
        let signed = sign(&Bundle::new(ns, name), &pem, "eksa.aws.com").unwrap();
        let bundle: Bundle = serde_json::from_value(signed.document).unwrap();
        store.create_bundle(&bundle).await.unwrap();
    }
    store
        .create_bundle(&Bundle::new(NS, "v1-21-1006"))
        .await
        .unwrap();

    let manager = LifecycleManager::new(
        config,
        store.clone(),
        Arc::new(StaticServerVersion::parse("1.21").unwrap()),
    )
    .with_trust_domain(domain);

    let expected = [
        (NS, "v1-21-1003", BundleState::UpgradeAvailable),
        (NS, "v1-21-1004", BundleState::Inactive),
        (NS, "v1-20-1009", BundleState::IgnoredVersion),
        (NS, "v1-21-1006", BundleState::Invalid),
        ("default", "v1-21-1005", BundleState::Ignored),
    ];
    for (ns, name, state) in expected {
        let mut bundle = store.get_bundle(ns, name).await.unwrap().unwrap();
        let update = manager.reconcile(&mut bundle).await.unwrap();
        assert_eq!(update.state, state, "{}/{}", ns, name);
        assert!(update.changed);
        assert_eq!(bundle.state(), Some(state));
    }

    let mut active = store.get_bundle(NS, "v1-21-1003").await.unwrap().unwrap();
    let update = manager.reconcile(&mut active).await.unwrap();
    assert!(!update.changed, "second pass should be a no-op");
}
