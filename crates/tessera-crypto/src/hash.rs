//! Keccak-256 hashing

use sha3::{Digest, Keccak256};
use tessera_primitives::H256;

/// Keccak-256 of `data`
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_bytes(Keccak256::digest(data).into())
}
