//! Execution engine seam

use std::collections::HashMap;

use bytes::Bytes;
use tessera_types::{ResourceKey, SignedTransaction};
use thiserror::Error;

/// Buffered state writes keyed by resource
pub type StateCache = HashMap<ResourceKey, Bytes>;

/// Layered read view handed to the engine.
///
/// Lookups go to the current Job's writes first, then to writes committed
/// by earlier Batches of the round, then to the state the round started
/// from.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    job: &'a StateCache,
    round: &'a StateCache,
    base: &'a StateCache,
}

impl<'a> StateView<'a> {
    /// Build a view from its three layers, innermost first
    pub fn new(job: &'a StateCache, round: &'a StateCache, base: &'a StateCache) -> Self {
        Self { job, round, base }
    }

    /// Latest value of `key`
    pub fn get(&self, key: &ResourceKey) -> Option<&'a Bytes> {
        self.job
            .get(key)
            .or_else(|| self.round.get(key))
            .or_else(|| self.base.get(key))
    }
}

/// Result of a successful call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Value returned to the caller
    pub return_value: Bytes,
    /// State written by the call
    pub writes: StateCache,
}

/// Contract-level failure; the call ran and reverted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ContractError(pub String);

/// The virtual machine that executes a transaction.
///
/// Calls are blocking and run on the blocking thread pool. An `Err`
/// consumes the sender's nonce like a success does.
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Execute `tx` against `state`
    fn execute(
        &self,
        tx: &SignedTransaction,
        state: &StateView<'_>,
    ) -> Result<ExecutionOutput, ContractError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_primitives::Address;

    #[test]
    fn test_view_prefers_inner_layers() {
        let key = ResourceKey::path(Address::from_low_u64(1), "balance");
        let other = ResourceKey::path(Address::from_low_u64(2), "balance");

        let base: StateCache = [(key.clone(), Bytes::from_static(b"base")), (other.clone(), Bytes::from_static(b"b2"))]
            .into_iter()
            .collect();
        let round: StateCache = [(key.clone(), Bytes::from_static(b"round"))].into_iter().collect();
        let mut job = StateCache::new();

        let view = StateView::new(&job, &round, &base);
        assert_eq!(view.get(&key).map(|b| &b[..]), Some(&b"round"[..]));
        assert_eq!(view.get(&other).map(|b| &b[..]), Some(&b"b2"[..]));

        job.insert(key.clone(), Bytes::from_static(b"job"));
        let view = StateView::new(&job, &round, &base);
        assert_eq!(view.get(&key).map(|b| &b[..]), Some(&b"job"[..]));
        assert!(view
            .get(&ResourceKey::account(Address::from_low_u64(3)))
            .is_none());
    }
}
