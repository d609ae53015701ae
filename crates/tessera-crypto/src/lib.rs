//! # tessera-crypto
//!
//! Cryptographic primitives used to admit transactions:
//!
//! - Keccak-256 hashing
//! - Recoverable secp256k1 signatures (low-s)
//! - Signer address derivation

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod hash;
mod signature;

pub use error::CryptoError;
pub use hash::keccak256;
pub use signature::{address_of, recover_signer, sign_hash, PrivateKey, PublicKey, Signature};
