//! # tessera-core
//!
//! Round coordination for Tessera.
//!
//! This crate ties the pool and the scheduler together:
//! - Draining the ready set from the [`TxPool`](tessera_txpool::TxPool)
//! - Planning it with the conflict grouper
//! - Running the plan under the round deadline
//! - Settling every Trace back into pool nonces and committing state

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod error;
mod round;

pub use config::RoundConfig;
pub use error::{RoundError, RoundResult};
pub use round::{RoundCoordinator, RoundReport};
