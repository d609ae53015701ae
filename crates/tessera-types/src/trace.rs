//! Execution traces

use bytes::Bytes;

use crate::transaction::TxHash;

/// Why a transaction failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FailureKind {
    /// The engine executed the call and it reverted
    Execution,
    /// The grouper could not plan the transaction
    Scheduling,
    /// The engine did not return a result (it panicked)
    System,
}

/// Terminal status of a transaction in a round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TraceStatus {
    /// Executed and its writes are kept
    Success,
    /// Did not succeed
    Failed(FailureKind),
    /// Not executed to completion this round; writes discarded
    Cancelled,
}

/// Outcome of one transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trace {
    /// Transaction this trace belongs to
    pub tx_hash: TxHash,
    /// Terminal status
    pub status: TraceStatus,
    /// Value returned by the engine on success
    pub return_value: Bytes,
    /// Failure or cancellation message
    pub error: Option<String>,
}

impl Trace {
    /// Successful execution
    pub fn success(tx_hash: TxHash, return_value: Bytes) -> Self {
        Self {
            tx_hash,
            status: TraceStatus::Success,
            return_value,
            error: None,
        }
    }

    /// Failure of the given kind
    pub fn failed(tx_hash: TxHash, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            tx_hash,
            status: TraceStatus::Failed(kind),
            return_value: Bytes::new(),
            error: Some(error.into()),
        }
    }

    /// Cancellation
    pub fn cancelled(tx_hash: TxHash, reason: impl Into<String>) -> Self {
        Self {
            tx_hash,
            status: TraceStatus::Cancelled,
            return_value: Bytes::new(),
            error: Some(reason.into()),
        }
    }

    /// True for [`TraceStatus::Success`]
    pub fn is_success(&self) -> bool {
        self.status == TraceStatus::Success
    }

    /// True if the sender's nonce moves past this transaction.
    ///
    /// Executed calls consume the nonce whether they succeed or revert.
    pub fn consumes_nonce(&self) -> bool {
        matches!(
            self.status,
            TraceStatus::Success | TraceStatus::Failed(FailureKind::Execution)
        )
    }

    /// True if the transaction goes back to the pool for a later round
    pub fn should_requeue(&self) -> bool {
        matches!(
            self.status,
            TraceStatus::Cancelled | TraceStatus::Failed(FailureKind::System)
        )
    }
}
