//! # tessera-primitives
//!
//! Fixed-width identifiers shared by every Tessera crate: account
//! addresses, 32-byte hashes and the nonce type.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bytes;
mod error;

pub use bytes::{Address, H256};
pub use error::PrimitiveError;

/// Per-account transaction sequence number
pub type Nonce = u64;
