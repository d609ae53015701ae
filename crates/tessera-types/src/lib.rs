//! # tessera-types
//!
//! Data carried between the pool, the grouper and the dispatcher:
//! - [`SignedTransaction`] - an account-nonce-ordered call
//! - [`ResourceKey`] - a piece of state owned by an account
//! - [`Trace`] - the outcome of one transaction in a round

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod resource;
pub mod trace;
pub mod transaction;

pub use resource::ResourceKey;
pub use trace::{FailureKind, Trace, TraceStatus};
pub use transaction::{SignedTransaction, Transaction, TxHash};
