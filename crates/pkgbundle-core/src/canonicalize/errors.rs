//! Digest and signature error types.

/// Errors from the canonical digest and signature engines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The domain's signature annotation is absent.
    #[error("missing signature")]
    MissingSignature,

    /// The excludes annotation is not valid base64.
    #[error("decoding excludes: {message}")]
    ExcludesNotBase64 { message: String },

    /// One or more exclude selectors are not pure field-index paths.
    #[error("invalid selector(s) provided: {}", .selectors.join(", "))]
    InvalidSelector { selectors: Vec<String> },

    /// The signature annotation is not valid base64.
    #[error("signature not base64: {message}")]
    SignatureNotBase64 { message: String },

    /// The trust domain's public key is not valid base64.
    #[error("public key not base64: {message}")]
    PublicKeyNotBase64 { message: String },

    /// The decoded public key is not a PKIX P-256 public key.
    #[error("public key not PKIX: {message}")]
    PublicKeyNotPkix { message: String },

    /// The private key could not be parsed or cannot sign.
    #[error("parsing private key: {message}")]
    PrivateKey { message: String },

    /// The signer failed to produce a signature.
    #[error("signing digest: {message}")]
    Signing { message: String },

    /// The manifest could not be converted to or from a document tree.
    #[error("converting manifest: {message}")]
    Document { message: String },

    /// The filter produced an impossible result.
    #[error("internal digest error: {message}")]
    Internal { message: String },
}

impl SignatureError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Input / format issues
            Self::ExcludesNotBase64 { .. } => 1,
            Self::InvalidSelector { .. } => 1,
            Self::PublicKeyNotBase64 { .. } => 1,
            Self::PublicKeyNotPkix { .. } => 1,
            Self::PrivateKey { .. } => 1,
            Self::Document { .. } => 1,

            // Security issues
            Self::MissingSignature => 4,
            Self::SignatureNotBase64 { .. } => 4,

            // Other
            Self::Signing { .. } => 6,
            Self::Internal { .. } => 6,
        }
    }

    pub(crate) fn document(err: impl std::fmt::Display) -> Self {
        Self::Document {
            message: err.to_string(),
        }
    }
}

/// Result type for digest and signature operations.
pub type SignatureResult<T> = Result<T, SignatureError>;
