//! Error types for the scheduler

use tessera_primitives::Address;
use tessera_types::TxHash;
use thiserror::Error;

/// Failure reported by a [`ResourceUsageDetector`](crate::ResourceUsageDetector)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DetectionError(pub String);

/// Scheduler errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// Resources of a transaction could not be determined
    #[error("resource detection failed for {tx}: {reason}")]
    ResourceDetection {
        /// Offending transaction
        tx: TxHash,
        /// Detector message
        reason: String,
    },

    /// Core count must be positive
    #[error("total core count {0} is invalid")]
    InvalidCoreCount(usize),

    /// Two Jobs of one Batch touch the same account
    #[error(
        "concurrency invariant violated in batch {batch}: account {account} used by jobs {first_job} and {second_job}"
    )]
    ConcurrencyInvariantViolation {
        /// Batch index
        batch: usize,
        /// Shared account
        account: Address,
        /// First Job using it
        first_job: usize,
        /// Second Job using it
        second_job: usize,
    },
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
