//! Round error types

use tessera_scheduler::SchedulerError;
use thiserror::Error;

/// Round errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// Planning or dispatch failed
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Result type for round operations
pub type RoundResult<T> = Result<T, RoundError>;
