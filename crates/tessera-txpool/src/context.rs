//! Persistent nonce store the pool reads on first sight of an account and
//! writes back after each round

use dashmap::DashMap;
use tessera_primitives::{Address, Nonce};

/// Source of truth for account nonces outside the pool
pub trait AccountContextService: Send + Sync {
    /// Next nonce for `account`, zero if unknown
    fn get_nonce(&self, account: &Address) -> Nonce;

    /// Persist the next nonce for `account`
    fn set_nonce(&self, account: &Address, nonce: Nonce);
}

/// Account context held in memory
#[derive(Debug, Default)]
pub struct InMemoryAccountContext {
    nonces: DashMap<Address, Nonce>,
}

impl InMemoryAccountContext {
    /// Empty context, every account starts at nonce zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with known nonces
    pub fn with_nonces(nonces: impl IntoIterator<Item = (Address, Nonce)>) -> Self {
        Self {
            nonces: nonces.into_iter().collect(),
        }
    }
}

impl AccountContextService for InMemoryAccountContext {
    fn get_nonce(&self, account: &Address) -> Nonce {
        self.nonces.get(account).map(|n| *n).unwrap_or(0)
    }

    fn set_nonce(&self, account: &Address, nonce: Nonce) {
        self.nonces.insert(*account, nonce);
    }
}
