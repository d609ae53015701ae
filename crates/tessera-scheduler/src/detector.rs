//! Resource usage detection

use std::collections::BTreeSet;

use tessera_types::{ResourceKey, SignedTransaction};

use crate::error::DetectionError;

/// Maps a transaction to the state it touches.
///
/// Implementations may over-approximate. The grouper always adds the
/// sender's own account.
pub trait ResourceUsageDetector: Send + Sync {
    /// Resource keys `tx` reads or writes
    fn get_resources(&self, tx: &SignedTransaction) -> Result<BTreeSet<ResourceKey>, DetectionError>;
}

/// Conservative detector: the sender and recipient accounts
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountResourceDetector;

impl ResourceUsageDetector for AccountResourceDetector {
    fn get_resources(&self, tx: &SignedTransaction) -> Result<BTreeSet<ResourceKey>, DetectionError> {
        Ok([ResourceKey::account(tx.sender()), ResourceKey::account(tx.to())]
            .into_iter()
            .collect())
    }
}

impl<F> ResourceUsageDetector for F
where
    F: Fn(&SignedTransaction) -> Result<BTreeSet<ResourceKey>, DetectionError> + Send + Sync,
{
    fn get_resources(&self, tx: &SignedTransaction) -> Result<BTreeSet<ResourceKey>, DetectionError> {
        self(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_crypto::Signature;
    use tessera_primitives::Address;
    use tessera_types::Transaction;

    #[test]
    fn test_account_detector_covers_both_ends() {
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);
        let tx = SignedTransaction::new(Transaction::new(a, 0, b, "transfer"), Signature::default());

        let keys = AccountResourceDetector.get_resources(&tx).unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&ResourceKey::account(a)));
        assert!(keys.contains(&ResourceKey::account(b)));
    }

    #[test]
    fn test_self_transfer_is_one_key() {
        let a = Address::from_low_u64(1);
        let tx = SignedTransaction::new(Transaction::new(a, 0, a, "transfer"), Signature::default());
        assert_eq!(AccountResourceDetector.get_resources(&tx).unwrap().len(), 1);
    }

    #[test]
    fn test_closure_detector() {
        let failing = |_: &SignedTransaction| -> Result<BTreeSet<ResourceKey>, DetectionError> {
            Err(DetectionError("no metadata".into()))
        };
        let tx = SignedTransaction::new(
            Transaction::new(Address::from_low_u64(1), 0, Address::from_low_u64(2), "call"),
            Signature::default(),
        );
        assert_eq!(
            failing.get_resources(&tx),
            Err(DetectionError("no metadata".into()))
        );
    }
}
