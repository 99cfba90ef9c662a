//! Operator configuration.

use serde::{Deserialize, Serialize};

use crate::trust::TrustDomain;

/// Namespace bundles and controllers must live in.
pub const DEFAULT_NAMESPACE: &str = "eksa-packages";

/// Name a bundle controller must have to be managed.
pub const DEFAULT_CONTROLLER_NAME: &str = "eksa-packages-bundle-controller";

/// Process-wide operator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Reserved namespace.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Reserved bundle controller name.
    #[serde(default = "default_controller_name")]
    pub controller_name: String,

    /// Base64 PKIX key replacing the default trust domain's key.
    #[serde(default)]
    pub public_key: Option<String>,

    #[serde(default)]
    pub registry: PullerConfig,
}

/// Settings for pulling bundles from OCI registries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullerConfig {
    /// Bearer token sent to registries.
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Talk plain HTTP to registries (local test registries only).
    #[serde(default)]
    pub insecure: bool,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            controller_name: default_controller_name(),
            public_key: None,
            registry: PullerConfig::default(),
        }
    }
}

impl Default for PullerConfig {
    fn default() -> Self {
        Self {
            token: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            insecure: false,
        }
    }
}

impl OperatorConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PKGBUNDLE_NAMESPACE` | Reserved namespace |
    /// | `PKGBUNDLE_CONTROLLER_NAME` | Reserved bundle controller name |
    /// | `PKGBUNDLE_PUBLIC_KEY` | Trust domain public key override |
    /// | `PKGBUNDLE_REGISTRY_TOKEN` | Registry bearer token |
    /// | `PKGBUNDLE_REGISTRY_TIMEOUT` | Request timeout in seconds |
    /// | `PKGBUNDLE_REGISTRY_MAX_RETRIES` | Retries for transient failures |
    /// | `PKGBUNDLE_REGISTRY_INSECURE` | Use plain HTTP |
    pub fn from_env() -> Self {
        Self {
            namespace: non_empty_var("PKGBUNDLE_NAMESPACE").unwrap_or_else(default_namespace),
            controller_name: non_empty_var("PKGBUNDLE_CONTROLLER_NAME")
                .unwrap_or_else(default_controller_name),
            public_key: non_empty_var(crate::trust::PUBLIC_KEY_ENV),
            registry: PullerConfig::from_env(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_controller_name(mut self, name: impl Into<String>) -> Self {
        self.controller_name = name.into();
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    pub fn with_registry(mut self, registry: PullerConfig) -> Self {
        self.registry = registry;
        self
    }

    /// The default trust domain with this config's key override applied.
    pub fn trust_domain(&self) -> TrustDomain {
        TrustDomain::default().with_public_key_override(self.public_key.clone())
    }
}

impl PullerConfig {
    pub fn from_env() -> Self {
        Self {
            token: non_empty_var("PKGBUNDLE_REGISTRY_TOKEN"),
            timeout_secs: std::env::var("PKGBUNDLE_REGISTRY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("PKGBUNDLE_REGISTRY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
            insecure: std::env::var("PKGBUNDLE_REGISTRY_INSECURE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
