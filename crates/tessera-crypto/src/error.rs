//! Cryptographic errors

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signing failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// r/s scalars are not a valid signature
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// v byte is not a recovery id
    #[error("invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    /// Public key could not be recovered
    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),
}
