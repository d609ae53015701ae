//! Recoverable ECDSA over secp256k1

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use tessera_primitives::{Address, H256};

use crate::{keccak256, CryptoError};

/// Secret signing key
pub type PrivateKey = SigningKey;

/// Public verifying key
pub type PublicKey = VerifyingKey;

/// 65-byte recoverable signature laid out as `r || s || v`, with `v` in {0, 1}
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 65]);

impl Signature {
    /// Encoded length
    pub const LEN: usize = 65;

    /// Wrap raw `r || s || v` bytes without checking them
    pub const fn from_bytes(bytes: [u8; 65]) -> Self {
        Signature(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Recovery id byte
    pub fn v(&self) -> u8 {
        self.0[64]
    }
}

impl Default for Signature {
    fn default() -> Self {
        Signature([0u8; 65])
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(v={}, r={:02x?}..)", self.v(), &self.0[..4])
    }
}

/// Sign a 32-byte prehash, normalizing to low-s
pub fn sign_hash(hash: &H256, key: &PrivateKey) -> Result<Signature, CryptoError> {
    let (mut sig, mut recid) = key
        .sign_prehash_recoverable(hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recid = RecoveryId::new(!recid.is_y_odd(), recid.is_x_reduced());
    }

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&sig.to_bytes());
    bytes[64] = recid.to_byte();
    Ok(Signature(bytes))
}

/// Recover the address that produced `signature` over `hash`
pub fn recover_signer(hash: &H256, signature: &Signature) -> Result<Address, CryptoError> {
    let sig = EcdsaSignature::from_slice(&signature.0[..64])
        .map_err(|e| CryptoError::MalformedSignature(e.to_string()))?;
    // high-s signatures are malleable
    if sig.normalize_s().is_some() {
        return Err(CryptoError::MalformedSignature("high s".to_string()));
    }
    let recid =
        RecoveryId::from_byte(signature.v()).ok_or(CryptoError::InvalidRecoveryId(signature.v()))?;

    let key = VerifyingKey::recover_from_prehash(hash.as_bytes(), &sig, recid)
        .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
    Ok(address_of(&key))
}

/// Address of a public key: last 20 bytes of keccak256 over the uncompressed point
pub fn address_of(key: &PublicKey) -> Address {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::from_bytes(bytes)
}
