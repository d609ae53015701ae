//! Transaction pool error types

use tessera_primitives::{Address, Nonce};
use thiserror::Error;

/// Coarse result of an `enqueue` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionOutcome {
    /// Admitted
    Success,
    /// Nonce already used
    AlreadyExecuted,
    /// Pool is not accepting submissions
    PoolClosed,
    /// Failed an admission check
    Invalid,
    /// Another transaction holds the same (sender, nonce) slot
    DuplicateNonce,
    /// A capacity limit was hit
    PoolFull,
}

/// Reason a transaction failed admission checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    /// Sender is the zero address
    #[error("sender is the zero address")]
    ZeroSender,

    /// No method name
    #[error("method name is empty")]
    EmptyMethod,

    /// Encoded transaction exceeds the size limit
    #[error("transaction too large: {size} > {limit} bytes")]
    TooLarge {
        /// Encoded size
        size: usize,
        /// Configured limit
        limit: usize,
    },

    /// Fee below the pool minimum
    #[error("fee too low: {fee} < {minimum}")]
    FeeTooLow {
        /// Offered fee
        fee: u64,
        /// Configured minimum
        minimum: u64,
    },

    /// Signature does not recover
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// Signature recovers to someone other than the sender
    #[error("signed by {recovered}, not by sender")]
    SenderMismatch {
        /// Recovered signer
        recovered: Address,
    },

    /// Nonce too far ahead of the next expected one
    #[error("nonce gap too large: next expected {expected}, got {nonce}")]
    NonceGapTooLarge {
        /// Next nonce the account can execute
        expected: Nonce,
        /// Transaction nonce
        nonce: Nonce,
    },

    /// Nonce is `Nonce::MAX`, which leaves no successor
    #[error("nonce {0} has no successor")]
    NonceExhausted(Nonce),
}

/// Rejection returned by `enqueue`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsertionError {
    /// Nonce below the account's next expected nonce
    #[error("nonce already executed: expected at least {expected}, got {got}")]
    AlreadyExecuted {
        /// Next expected nonce
        expected: Nonce,
        /// Transaction nonce
        got: Nonce,
    },

    /// Pool is closed
    #[error("transaction pool is closed")]
    PoolClosed,

    /// Slot already taken
    #[error("duplicate nonce {nonce} for {sender}")]
    DuplicateNonce {
        /// Sender
        sender: Address,
        /// Contested nonce
        nonce: Nonce,
    },

    /// Admission check failed
    #[error("invalid transaction: {0}")]
    Invalid(#[from] InvalidReason),

    /// Capacity limit reached
    #[error("pool is full (limit: {limit})")]
    PoolFull {
        /// The limit that was hit
        limit: usize,
    },
}

impl InsertionError {
    /// Outcome code for this rejection
    pub fn outcome(&self) -> InsertionOutcome {
        match self {
            InsertionError::AlreadyExecuted { .. } => InsertionOutcome::AlreadyExecuted,
            InsertionError::PoolClosed => InsertionOutcome::PoolClosed,
            InsertionError::DuplicateNonce { .. } => InsertionOutcome::DuplicateNonce,
            InsertionError::Invalid(_) => InsertionOutcome::Invalid,
            InsertionError::PoolFull { .. } => InsertionOutcome::PoolFull,
        }
    }
}

/// Result type for transaction pool operations
pub type TxPoolResult<T> = Result<T, InsertionError>;
