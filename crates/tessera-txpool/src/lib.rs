//! # tessera-txpool
//!
//! Transaction pool that decides which transactions are eligible for the
//! next execution round.
//!
//! This crate provides:
//! - Stateless admission checks (format, size, fee, signature)
//! - A per-account split between *executable* transactions (a gap-free
//!   nonce run starting at the account nonce) and *waiting* ones
//! - Draining executable transactions for a round, and settling the
//!   round's traces back into nonces
//! - Nonce bootstrap and write-back through [`AccountContextService`]
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------+
//! |            TxPool              |
//! +--------------------------------+
//!                |
//! +--------------+-----------------+
//! | executable (VecDeque) | waiting (BTreeMap) |  <- per account
//! +--------------+-----------------+
//!                |
//! +--------------------------------+
//! | nonces  <->  AccountContext    |  <- next expected nonce
//! +--------------------------------+
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use tessera_txpool::TxPool;
//!
//! let pool = TxPool::with_defaults();
//! pool.enqueue(tx)?;
//! let ready = pool.ready_transactions(1000);
//! // ... execute ...
//! pool.settle(&traces);
//! ```
//!
//! All pool state sits behind one lock, so operations on the same pool are
//! serialized.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
mod error;
mod pool;
mod validator;

pub use context::{AccountContextService, InMemoryAccountContext};
pub use error::{InsertionError, InsertionOutcome, InvalidReason, TxPoolResult};
pub use pool::{PoolConfig, Settlement, TxPool};
pub use validator::TxValidator;
