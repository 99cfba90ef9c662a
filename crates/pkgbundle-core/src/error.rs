//! Error types for bundle trust and lifecycle management.

use crate::canonicalize::SignatureError;

/// Bundle errors.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Digest or signature engine failure.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Bundle name is not of the form `v<major>-<minor>-<sequence>`.
    #[error("invalid bundle name: {name}")]
    InvalidName { name: String },

    /// Artifact reference could not be parsed.
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Registry could not be reached or refused the pull.
    #[error("pulling package bundle {reference}: {message}")]
    Registry { reference: String, message: String },

    /// A pulled artifact had no content.
    #[error("package bundle artifact is empty: {reference}")]
    EmptyArtifact { reference: String },

    /// A document could not be decoded.
    #[error("unmarshalling package bundle: {message}")]
    Decode { message: String },

    /// The cluster's server version could not be resolved.
    #[error("getting server version: {message}")]
    ServerVersion { message: String },

    /// Resource not found in the store.
    #[error("{kind} not found: {namespace}/{name}")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    /// Optimistic concurrency check failed on write.
    #[error("conflict writing {kind} {name}: resource version {expected} is stale")]
    Conflict {
        kind: &'static str,
        name: String,
        expected: String,
    },

    /// Any other store failure.
    #[error("store error: {message}")]
    Store { message: String },

    /// Package missing from a bundle.
    #[error("package not found in bundle ({bundle}): {package}")]
    PackageNotFound { bundle: String, package: String },

    /// Package version missing from a bundle.
    #[error("package version not found in bundle ({bundle}): {package} @ {version}")]
    VersionNotFound {
        bundle: String,
        package: String,
        version: String,
    },

    /// Package configuration schema could not be decoded.
    #[error("error decoding configurations: {message}")]
    Schema { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl BundleError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Input / format issues
            Self::InvalidName { .. } => 1,
            Self::InvalidReference { .. } => 1,
            Self::Decode { .. } => 1,
            Self::Config { .. } => 1,
            Self::Schema { .. } => 1,
            Self::PackageNotFound { .. } => 1,
            Self::VersionNotFound { .. } => 1,
            Self::NotFound { .. } => 1,

            // Security issues
            Self::Signature(e) => e.exit_code(),

            // Network/transient
            Self::Registry { .. } => 5,
            Self::EmptyArtifact { .. } => 5,
            Self::ServerVersion { .. } => 5,
            Self::Conflict { .. } => 5,
            Self::Store { .. } => 5,
        }
    }

    /// Whether the error is transient and should be left for the next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Registry { .. }
                | Self::ServerVersion { .. }
                | Self::Conflict { .. }
                | Self::Store { .. }
        )
    }
}

/// Result type for bundle operations.
pub type BundleResult<T> = Result<T, BundleError>;
