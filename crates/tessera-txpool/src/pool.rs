//! Transaction pool implementation

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tessera_primitives::{Address, Nonce};
use tessera_types::{SignedTransaction, Trace, TxHash};
use tracing::{debug, warn};

use crate::context::{AccountContextService, InMemoryAccountContext};
use crate::error::{InsertionError, InsertionOutcome, InvalidReason, TxPoolResult};
use crate::validator::TxValidator;

/// Pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of executable transactions across all accounts
    pub max_executable: usize,
    /// Maximum number of waiting transactions across all accounts
    pub max_waiting: usize,
    /// Maximum transactions held per account
    pub max_per_account: usize,
    /// How far past the next expected nonce a submission may be
    pub max_nonce_gap: u64,
    /// Maximum encoded transaction size in bytes
    pub tx_size_limit: usize,
    /// Minimum fee
    pub min_fee: u64,
    /// Recover the signer and require it to match the sender
    pub verify_signatures: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_executable: 65_536,
            max_waiting: 16_384,
            max_per_account: 1_024,
            max_nonce_gap: 1_024,
            tx_size_limit: 64 * 1024,
            min_fee: 0,
            verify_signatures: true,
        }
    }
}

/// Counts produced by [`TxPool::settle`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settlement {
    /// Transactions whose nonce was consumed
    pub consumed: usize,
    /// Transactions put back into the pool
    pub requeued: usize,
    /// Transactions dropped without consuming their nonce
    pub dropped: usize,
    /// Accounts whose nonce was rolled back
    pub rewound: usize,
}

/// Transactions of one account
#[derive(Default)]
struct AccountQueue {
    /// nonce -> tx, not contiguous with the executable run
    waiting: BTreeMap<Nonce, SignedTransaction>,
    /// `executable[i].nonce() == nonces[account] + i`
    executable: VecDeque<SignedTransaction>,
}

impl AccountQueue {
    fn is_empty(&self) -> bool {
        self.waiting.is_empty() && self.executable.is_empty()
    }

    fn len(&self) -> usize {
        self.waiting.len() + self.executable.len()
    }
}

#[derive(Default)]
struct PoolState {
    accounts: BTreeMap<Address, AccountQueue>,
    nonces: HashMap<Address, Nonce>,
    by_hash: HashMap<TxHash, (Address, Nonce)>,
    executable_count: usize,
    waiting_count: usize,
    closed: bool,
}

impl PoolState {
    fn next_executable_nonce(&self, account: &Address) -> Option<Nonce> {
        let base = *self.nonces.get(account)?;
        let run = self
            .accounts
            .get(account)
            .map(|q| q.executable.len() as u64)
            .unwrap_or(0);
        Some(base.saturating_add(run))
    }

    fn insert_waiting(&mut self, tx: SignedTransaction) -> bool {
        let sender = tx.sender();
        let nonce = tx.nonce();
        let hash = tx.hash();
        let queue = self.accounts.entry(sender).or_default();
        if queue.waiting.contains_key(&nonce) {
            return false;
        }
        queue.waiting.insert(nonce, tx);
        self.by_hash.insert(hash, (sender, nonce));
        self.waiting_count += 1;
        true
    }

    /// Move the waiting run that continues the executable run, dropping
    /// waiting entries the account nonce has already passed.
    fn promote(&mut self, account: &Address, max_executable: usize) -> usize {
        let Some(base) = self.nonces.get(account).copied() else {
            return 0;
        };
        let Some(queue) = self.accounts.get_mut(account) else {
            return 0;
        };

        let mut next = base.saturating_add(queue.executable.len() as u64);
        let live = queue.waiting.split_off(&next);
        let stale = std::mem::replace(&mut queue.waiting, live);
        for (nonce, tx) in stale {
            debug!(%account, nonce, hash = %tx.hash(), "Dropping stale waiting transaction");
            self.by_hash.remove(&tx.hash());
            self.waiting_count -= 1;
        }

        let mut moved = 0;
        while self.executable_count < max_executable {
            let Some(tx) = queue.waiting.remove(&next) else {
                break;
            };
            queue.executable.push_back(tx);
            self.waiting_count -= 1;
            self.executable_count += 1;
            moved += 1;
            let Some(after) = next.checked_add(1) else {
                break;
            };
            next = after;
        }

        if queue.is_empty() {
            self.accounts.remove(account);
        }
        moved
    }

    /// Return every executable transaction of `account` to waiting and set
    /// its nonce. Waiting entries below the new nonce are dropped.
    fn withdraw(&mut self, account: &Address, nonce: Nonce) {
        self.nonces.insert(*account, nonce);
        let Some(queue) = self.accounts.get_mut(account) else {
            return;
        };
        let demoted = queue.executable.len();
        for tx in queue.executable.drain(..) {
            queue.waiting.insert(tx.nonce(), tx);
        }
        self.executable_count -= demoted;
        self.waiting_count += demoted;

        let live = queue.waiting.split_off(&nonce);
        let stale = std::mem::replace(&mut queue.waiting, live);
        for (_, tx) in stale {
            self.by_hash.remove(&tx.hash());
            self.waiting_count -= 1;
        }
        if queue.is_empty() {
            self.accounts.remove(account);
        }
    }

    fn drain_front(&mut self, account: &Address, count: usize) -> Vec<SignedTransaction> {
        let Some(queue) = self.accounts.get_mut(account) else {
            return Vec::new();
        };
        let take = count.min(queue.executable.len());
        let drained: Vec<_> = queue.executable.drain(..take).collect();
        for tx in &drained {
            self.by_hash.remove(&tx.hash());
        }
        self.executable_count -= take;
        if let Some(nonce) = self.nonces.get_mut(account) {
            *nonce = nonce.saturating_add(take as u64);
        }
        if queue.is_empty() {
            self.accounts.remove(account);
        }
        drained
    }
}

/// Transaction pool
pub struct TxPool {
    config: PoolConfig,
    validator: TxValidator,
    context: Arc<dyn AccountContextService>,
    state: Mutex<PoolState>,
}

impl TxPool {
    /// Create a pool backed by `context`
    pub fn new(config: PoolConfig, context: Arc<dyn AccountContextService>) -> Self {
        Self {
            validator: TxValidator::new(&config),
            config,
            context,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Default config with an in-memory account context
    pub fn with_defaults() -> Self {
        Self::new(
            PoolConfig::default(),
            Arc::new(InMemoryAccountContext::new()),
        )
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Admit a transaction.
    ///
    /// Rejections are checked in order: closed pool, stale nonce, admission
    /// checks, nonce gap, occupied slot, capacity.
    pub fn enqueue(&self, tx: SignedTransaction) -> TxPoolResult<InsertionOutcome> {
        // signature recovery runs outside the lock
        let validity = self.validator.validate(&tx);

        let mut state = self.state.lock();
        if state.closed {
            return Err(InsertionError::PoolClosed);
        }

        let sender = tx.sender();
        let nonce = tx.nonce();
        let tracked = state.nonces.get(&sender).copied();
        let current = tracked.unwrap_or_else(|| self.context.get_nonce(&sender));
        if nonce < current {
            return Err(InsertionError::AlreadyExecuted {
                expected: current,
                got: nonce,
            });
        }
        validity?;

        let expected = state.next_executable_nonce(&sender).unwrap_or(current);
        if nonce > expected.saturating_add(self.config.max_nonce_gap) {
            return Err(InvalidReason::NonceGapTooLarge { expected, nonce }.into());
        }

        let held = state.accounts.get(&sender).map(AccountQueue::len).unwrap_or(0);
        let occupied = nonce < expected
            || state
                .accounts
                .get(&sender)
                .is_some_and(|q| q.waiting.contains_key(&nonce));
        if occupied {
            return Err(InsertionError::DuplicateNonce { sender, nonce });
        }
        if held >= self.config.max_per_account {
            return Err(InsertionError::PoolFull {
                limit: self.config.max_per_account,
            });
        }
        let stays_waiting =
            nonce != expected || state.executable_count >= self.config.max_executable;
        if stays_waiting && state.waiting_count >= self.config.max_waiting {
            return Err(InsertionError::PoolFull {
                limit: self.config.max_waiting,
            });
        }

        let hash = tx.hash();
        if tracked.is_none() {
            state.nonces.insert(sender, current);
        }
        state.insert_waiting(tx);
        let promoted = state.promote(&sender, self.config.max_executable);
        debug!(%sender, nonce, %hash, promoted, "Transaction enqueued");
        Ok(InsertionOutcome::Success)
    }

    /// Promote waiting transactions of `account` that continue its executable
    /// run. Returns how many moved.
    pub fn promote(&self, account: &Address) -> usize {
        self.state.lock().promote(account, self.config.max_executable)
    }

    /// Promote every account
    pub fn promote_all(&self) -> usize {
        let mut state = self.state.lock();
        let accounts: Vec<Address> = state.accounts.keys().copied().collect();
        accounts
            .iter()
            .map(|a| state.promote(a, self.config.max_executable))
            .sum()
    }

    /// Drain up to `limit` executable transactions, visiting accounts in
    /// address order and taking each account's run from its lowest nonce.
    /// Account nonces advance past everything returned.
    pub fn ready_transactions(&self, limit: usize) -> Vec<SignedTransaction> {
        let mut state = self.state.lock();
        let accounts: Vec<Address> = state
            .accounts
            .iter()
            .filter(|(_, q)| !q.executable.is_empty())
            .map(|(a, _)| *a)
            .collect();

        let mut ready = Vec::with_capacity(limit.min(state.executable_count));
        for account in accounts {
            if ready.len() >= limit {
                break;
            }
            let room = limit - ready.len();
            ready.extend(state.drain_front(&account, room));
        }

        // executable capacity freed up
        let waiting: Vec<Address> = state
            .accounts
            .iter()
            .filter(|(_, q)| !q.waiting.is_empty())
            .map(|(a, _)| *a)
            .collect();
        for account in waiting {
            state.promote(&account, self.config.max_executable);
        }

        debug!(count = ready.len(), limit, "Drained ready transactions");
        ready
    }

    /// Drain exactly `count` executable transactions of `account`, provided
    /// its run starts at `start` and holds at least `count` entries.
    pub fn ready_transactions_for(
        &self,
        account: &Address,
        start: Nonce,
        count: usize,
    ) -> Option<Vec<SignedTransaction>> {
        let mut state = self.state.lock();
        let queue = state.accounts.get(account)?;
        let head = queue.executable.front()?;
        if head.nonce() != start || queue.executable.len() < count {
            return None;
        }
        Some(state.drain_front(account, count))
    }

    /// Remove `tx` from the pool.
    ///
    /// If it sits in the executable run, everything behind it returns to
    /// waiting. Returns false if the pool does not hold it.
    pub fn discard(&self, tx: &SignedTransaction) -> bool {
        let mut state = self.state.lock();
        let Some((sender, nonce)) = state.by_hash.get(&tx.hash()).copied() else {
            return false;
        };
        let Some(base) = state.nonces.get(&sender).copied() else {
            return false;
        };
        let Some(queue) = state.accounts.get_mut(&sender) else {
            return false;
        };

        let (from_executable, demoted) = match nonce.checked_sub(base) {
            Some(offset) if (offset as usize) < queue.executable.len() => {
                let mut tail = queue.executable.split_off(offset as usize);
                tail.pop_front();
                let demoted = tail.len();
                for later in tail {
                    queue.waiting.insert(later.nonce(), later);
                }
                (true, demoted)
            }
            _ => {
                queue.waiting.remove(&nonce);
                (false, 0)
            }
        };
        let emptied = queue.is_empty();

        if from_executable {
            state.executable_count -= demoted + 1;
            state.waiting_count += demoted;
        } else {
            state.waiting_count -= 1;
        }
        state.by_hash.remove(&tx.hash());
        if emptied {
            state.accounts.remove(&sender);
        }
        debug!(%sender, nonce, demoted, "Discarded transaction");
        true
    }

    /// Return every executable transaction of `account` to waiting and set
    /// its nonce to `nonce`.
    pub fn withdraw(&self, account: &Address, nonce: Nonce) {
        self.state.lock().withdraw(account, nonce);
    }

    /// Set the nonce of an account the pool has not seen yet. Returns false
    /// if the pool already tracks it.
    pub fn try_set_nonce(&self, account: &Address, nonce: Nonce) -> bool {
        let mut state = self.state.lock();
        if state.nonces.contains_key(account) {
            return false;
        }
        state.nonces.insert(*account, nonce);
        true
    }

    /// Fold a round's traces back into account nonces.
    ///
    /// For each sender, nonces up to its first transaction that did not
    /// consume a nonce stay consumed; the sender is rolled back to that
    /// transaction. Cancelled transactions from that point on return to
    /// waiting, other failures are dropped. Final nonces are written to the
    /// account context.
    pub fn settle(&self, results: &[(SignedTransaction, Trace)]) -> Settlement {
        let mut by_sender: BTreeMap<Address, Vec<(&SignedTransaction, &Trace)>> = BTreeMap::new();
        for (tx, trace) in results {
            by_sender.entry(tx.sender()).or_default().push((tx, trace));
        }

        let mut summary = Settlement::default();
        let mut state = self.state.lock();
        for (sender, mut entries) in by_sender {
            entries.sort_by_key(|(tx, _)| tx.nonce());

            let rewind_to = entries
                .iter()
                .find(|(_, trace)| !trace.consumes_nonce())
                .map(|(tx, _)| tx.nonce());

            match rewind_to {
                None => summary.consumed += entries.len(),
                Some(rewind) => {
                    state.withdraw(&sender, rewind);
                    summary.rewound += 1;
                    for (tx, trace) in entries {
                        if tx.nonce() < rewind {
                            summary.consumed += 1;
                        } else if trace.should_requeue() {
                            if state.insert_waiting(tx.clone()) {
                                summary.requeued += 1;
                            } else {
                                summary.dropped += 1;
                            }
                        } else {
                            if trace.consumes_nonce() {
                                warn!(
                                    %sender,
                                    nonce = tx.nonce(),
                                    "Transaction executed after an earlier nonce of the same sender did not"
                                );
                            }
                            summary.dropped += 1;
                        }
                    }
                    state.promote(&sender, self.config.max_executable);
                }
            }

            if let Some(nonce) = state.nonces.get(&sender) {
                self.context.set_nonce(&sender, *nonce);
            }
        }

        debug!(
            consumed = summary.consumed,
            requeued = summary.requeued,
            dropped = summary.dropped,
            rewound = summary.rewound,
            "Settled round"
        );
        summary
    }

    /// Transaction by hash
    pub fn get(&self, hash: &TxHash) -> Option<SignedTransaction> {
        let state = self.state.lock();
        let (sender, nonce) = state.by_hash.get(hash)?;
        let queue = state.accounts.get(sender)?;
        if let Some(tx) = queue.waiting.get(nonce) {
            return Some(tx.clone());
        }
        let base = state.nonces.get(sender)?;
        let offset = nonce.checked_sub(*base)?;
        queue.executable.get(offset as usize).cloned()
    }

    /// True if the pool holds `hash`
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.state.lock().by_hash.contains_key(hash)
    }

    /// Tracked nonce of `account`: the next nonce to hand out for execution
    pub fn account_nonce(&self, account: &Address) -> Option<Nonce> {
        self.state.lock().nonces.get(account).copied()
    }

    /// Next nonce a sender should use: the nonce after its executable run
    pub fn next_nonce(&self, account: &Address) -> Nonce {
        let state = self.state.lock();
        state
            .next_executable_nonce(account)
            .unwrap_or_else(|| self.context.get_nonce(account))
    }

    /// Snapshot of the executable run of `account`
    pub fn executable_of(&self, account: &Address) -> Vec<SignedTransaction> {
        self.state
            .lock()
            .accounts
            .get(account)
            .map(|q| q.executable.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Snapshot of the waiting set of `account`, nonce ascending
    pub fn waiting_of(&self, account: &Address) -> Vec<SignedTransaction> {
        self.state
            .lock()
            .accounts
            .get(account)
            .map(|q| q.waiting.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Total transactions held
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.executable_count + state.waiting_count
    }

    /// True if the pool holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Executable transaction count
    pub fn executable_len(&self) -> usize {
        self.state.lock().executable_count
    }

    /// Waiting transaction count
    pub fn waiting_len(&self) -> usize {
        self.state.lock().waiting_count
    }

    /// Stop accepting submissions
    pub fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Accept submissions again
    pub fn open(&self) {
        self.state.lock().closed = false;
    }

    /// True if closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Drop every transaction. Tracked nonces are kept.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.accounts.clear();
        state.by_hash.clear();
        state.executable_count = 0;
        state.waiting_count = 0;
    }
}
