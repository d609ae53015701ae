//! # tessera-scheduler
//!
//! Plans and runs one execution round.
//!
//! - [`ConflictGrouper`] partitions ready transactions into a
//!   [`ParallelGroup`]: ordered [`Batch`]es of account-disjoint [`Job`]s,
//!   computed with union-find over the accounts each transaction touches.
//! - [`ExecutionDispatcher`] runs the Batches one after another, the Jobs of
//!   a Batch concurrently on a bounded worker pool, under a round deadline.
//!
//! ```text
//!  ready txs ──> ResourceUsageDetector ──> union-find ──> ParallelGroup
//!                                                           │
//!       Batch 0: [Job][Job][Job]   (concurrent)             │
//!       Batch 1: [Job][Job]        (after Batch 0)   <──────┘
//!                    │
//!                    └──> ExecutionEngine ──> Trace per transaction
//! ```
//!
//! Both collaborators, the detector and the engine, are traits.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod detector;
mod dispatcher;
mod engine;
mod error;
mod grouper;
mod plan;
mod rebalance;
mod union_find;

pub use detector::{AccountResourceDetector, ResourceUsageDetector};
pub use dispatcher::{DispatcherConfig, ExecutionDispatcher, RoundExecution};
pub use engine::{ContractError, ExecutionEngine, ExecutionOutput, StateCache, StateView};
pub use error::{DetectionError, SchedulerError, SchedulerResult};
pub use grouper::{ConflictGrouper, ConnectedGroups, GrouperConfig};
pub use plan::{Batch, Job, ParallelGroup};
pub use rebalance::{rebalance, GroupStrategy, Mergeable};
