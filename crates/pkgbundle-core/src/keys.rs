//! P-256 key material encoding.
//!
//! Public keys travel as base64 PKIX (SubjectPublicKeyInfo DER); private keys
//! as SEC1 PEM (`EC PRIVATE KEY`), with PKCS#8 PEM also accepted on input.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::SecretKey;
use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};

use crate::canonicalize::{SignatureError, SignatureResult};

/// Decode a base64 PKIX public key.
pub fn decode_public_key(b64: &str) -> SignatureResult<VerifyingKey> {
    let der = BASE64
        .decode(b64.trim())
        .map_err(|e| SignatureError::PublicKeyNotBase64 {
            message: e.to_string(),
        })?;
    VerifyingKey::from_public_key_der(&der).map_err(|e| SignatureError::PublicKeyNotPkix {
        message: e.to_string(),
    })
}

/// Encode a public key as base64 PKIX.
pub fn encode_public_key(key: &VerifyingKey) -> SignatureResult<String> {
    let der = key
        .to_public_key_der()
        .map_err(|e| SignatureError::PublicKeyNotPkix {
            message: e.to_string(),
        })?;
    Ok(BASE64.encode(der.as_bytes()))
}

/// Parse a PEM private key (SEC1, falling back to PKCS#8).
pub fn parse_private_key(pem: &str) -> SignatureResult<SigningKey> {
    let secret = SecretKey::from_sec1_pem(pem)
        .or_else(|_| SecretKey::from_pkcs8_pem(pem))
        .map_err(|e| SignatureError::PrivateKey {
            message: e.to_string(),
        })?;
    Ok(SigningKey::from(secret))
}

/// A freshly generated signing key pair.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::rngs::OsRng),
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// SEC1 PEM encoding of the private key.
    pub fn private_key_pem(&self) -> SignatureResult<String> {
        let secret = SecretKey::from(*self.signing_key.as_nonzero_scalar());
        secret
            .to_sec1_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|e| SignatureError::PrivateKey {
                message: e.to_string(),
            })
    }

    /// Base64 PKIX encoding of the public key.
    pub fn public_key_base64(&self) -> SignatureResult<String> {
        encode_public_key(self.signing_key.verifying_key())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}
