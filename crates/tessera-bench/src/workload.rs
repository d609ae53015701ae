//! Synthetic signed-transfer workload and the engine that runs it

use std::time::Duration;

use bytes::Bytes;
use k256::ecdsa::SigningKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_crypto::address_of;
use tessera_primitives::Address;
use tessera_scheduler::{ContractError, ExecutionEngine, ExecutionOutput, StateCache, StateView};
use tessera_types::{ResourceKey, SignedTransaction, Transaction};

use crate::config::WorkloadConfig;

/// Method name of a transfer
pub const TRANSFER: &str = "transfer";

/// Balance slot of `owner`
pub fn balance_key(owner: Address) -> ResourceKey {
    ResourceKey::path(owner, "balance")
}

fn encode(value: u64) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

fn decode(bytes: &[u8]) -> Option<u64> {
    <[u8; 8]>::try_from(bytes).ok().map(u64::from_be_bytes)
}

/// Generated accounts and transactions
pub struct Workload {
    /// Account addresses, hot accounts first
    pub accounts: Vec<Address>,
    /// Signed transfers in generation order
    pub transactions: Vec<SignedTransaction>,
}

impl Workload {
    /// Generate keys and signed transfers
    pub fn generate(config: &WorkloadConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(config.accounts >= 2, "workload needs at least two accounts");
        let mut rng = StdRng::seed_from_u64(config.seed);

        let keys: Vec<SigningKey> = (0..config.accounts)
            .map(|_| SigningKey::random(&mut rng))
            .collect();
        let accounts: Vec<Address> = keys.iter().map(|k| address_of(k.verifying_key())).collect();
        let hot = config.hot_accounts.clamp(1, accounts.len());

        let mut nonces = vec![0u64; accounts.len()];
        let mut transactions = Vec::with_capacity(config.tx_count);
        for _ in 0..config.tx_count {
            let from = rng.gen_range(0..accounts.len());
            let mut to = if rng.gen_bool(config.conflict_ratio.clamp(0.0, 1.0)) {
                rng.gen_range(0..hot)
            } else {
                rng.gen_range(0..accounts.len())
            };
            if to == from {
                to = (from + rng.gen_range(1..accounts.len())) % accounts.len();
            }

            let tx = Transaction::new(accounts[from], nonces[from], accounts[to], TRANSFER)
                .with_params(encode(1))
                .sign(&keys[from])?;
            nonces[from] += 1;
            transactions.push(tx);
        }

        Ok(Self {
            accounts,
            transactions,
        })
    }

    /// Initial state: every account holds `balance`
    pub fn genesis(&self, balance: u64) -> StateCache {
        self.accounts
            .iter()
            .map(|a| (balance_key(*a), encode(balance)))
            .collect()
    }
}

/// Moves the amount in `params` from sender to recipient
pub struct TransferEngine {
    work: Duration,
}

impl TransferEngine {
    /// Engine that spends `work` per call
    pub fn new(work: Duration) -> Self {
        Self { work }
    }
}

impl ExecutionEngine for TransferEngine {
    fn execute(
        &self,
        tx: &SignedTransaction,
        state: &StateView<'_>,
    ) -> Result<ExecutionOutput, ContractError> {
        if tx.method_name() != TRANSFER {
            return Err(ContractError(format!("unknown method {}", tx.method_name())));
        }
        let amount = decode(tx.params()).ok_or_else(|| ContractError("malformed amount".into()))?;
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }

        let from = balance_key(tx.sender());
        let to = balance_key(tx.to());
        let balance_of = |key: &ResourceKey| state.get(key).and_then(|b| decode(b)).unwrap_or(0);

        let have = balance_of(&from);
        let left = have.checked_sub(amount).ok_or_else(|| {
            ContractError(format!("insufficient balance: required {amount}, available {have}"))
        })?;

        let mut writes = StateCache::new();
        let after = if tx.to() == tx.sender() {
            have
        } else {
            writes.insert(to.clone(), encode(balance_of(&to).saturating_add(amount)));
            left
        };
        writes.insert(from, encode(after));
        Ok(ExecutionOutput {
            return_value: encode(after),
            writes,
        })
    }
}
