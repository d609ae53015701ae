//! Conflict grouping
//!
//! Transactions conflict when they touch the same account. Connected
//! components of the account graph are found with union-find; each
//! component is then layered by sender nonce rank, so Batch `k` holds the
//! `k`-th ready transaction of every sender, and the transactions of one
//! layer that still share accounts form one Job.

use std::collections::{BTreeSet, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_primitives::{Address, Nonce};
use tessera_types::{FailureKind, SignedTransaction, Trace};
use tracing::{debug, info, warn};

use crate::detector::{AccountResourceDetector, ResourceUsageDetector};
use crate::error::{SchedulerError, SchedulerResult};
use crate::plan::{Batch, Job, ParallelGroup};
use crate::rebalance::{merge, GroupStrategy};
use crate::union_find::AccountSets;

/// Grouper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrouperConfig {
    /// How the Jobs of each Batch are merged to the core count
    pub strategy: GroupStrategy,
    /// Cores available for concurrent Jobs
    pub core_count: usize,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            strategy: GroupStrategy::Naive,
            core_count: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
        }
    }
}

/// Connected account groups of a transaction set
#[derive(Debug, Clone, Default)]
pub struct ConnectedGroups {
    /// Groups in first-seen order, transactions in input order
    pub groups: Vec<Vec<SignedTransaction>>,
    /// Transactions that could not be grouped, with their Trace
    pub excluded: Vec<(SignedTransaction, Trace)>,
}

impl ConnectedGroups {
    /// Group sizes
    pub fn sizes(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).collect()
    }
}

struct Detected {
    tx: SignedTransaction,
    /// sender first, no duplicates
    accounts: Vec<Address>,
}

/// Partitions ready transactions into conflict-free units
pub struct ConflictGrouper {
    detector: Arc<dyn ResourceUsageDetector>,
    strategy: GroupStrategy,
    cores: NonZeroUsize,
}

impl ConflictGrouper {
    /// Create a grouper. Fails if `config.core_count` is zero.
    pub fn new(
        detector: Arc<dyn ResourceUsageDetector>,
        config: GrouperConfig,
    ) -> SchedulerResult<Self> {
        let cores = NonZeroUsize::new(config.core_count)
            .ok_or(SchedulerError::InvalidCoreCount(config.core_count))?;
        Ok(Self {
            detector,
            strategy: config.strategy,
            cores,
        })
    }

    /// Grouper over sender and recipient accounts with the default config
    pub fn with_defaults() -> Self {
        let config = GrouperConfig::default();
        Self {
            detector: Arc::new(AccountResourceDetector),
            strategy: config.strategy,
            cores: NonZeroUsize::new(config.core_count).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Split `txs` into connected account groups
    pub fn group_connected(&self, txs: Vec<SignedTransaction>) -> ConnectedGroups {
        let total = txs.len();
        let (admitted, excluded) = self.detect(txs);
        let components = {
            let lists: Vec<&[Address]> = admitted.iter().map(|d| d.accounts.as_slice()).collect();
            connected(&lists)
        };

        let mut slots: Vec<Option<SignedTransaction>> =
            admitted.into_iter().map(|d| Some(d.tx)).collect();
        let groups: Vec<Vec<SignedTransaction>> = components
            .into_iter()
            .map(|members| members.into_iter().filter_map(|i| slots[i].take()).collect())
            .collect();

        let grouped = ConnectedGroups { groups, excluded };
        info!(
            "Grouped {} transactions into {} groups with sizes {:?}, {} excluded",
            total,
            grouped.groups.len(),
            grouped.sizes(),
            grouped.excluded.len()
        );
        grouped
    }

    /// Connected groups merged down to `cores` groups with `strategy`
    pub fn group_with_core_count(
        &self,
        strategy: GroupStrategy,
        cores: usize,
        txs: Vec<SignedTransaction>,
    ) -> SchedulerResult<ConnectedGroups> {
        if txs.is_empty() {
            return Ok(ConnectedGroups::default());
        }
        let cores = NonZeroUsize::new(cores).ok_or(SchedulerError::InvalidCoreCount(cores))?;

        let mut grouped = self.group_connected(txs);
        let before = grouped.groups.len();
        grouped.groups = merge(strategy, cores, grouped.groups);
        info!(
            "Merged {} groups into {} groups with sizes {:?}",
            before,
            grouped.groups.len(),
            grouped.sizes()
        );
        Ok(grouped)
    }

    /// Build the execution plan for one round.
    ///
    /// Transactions whose resources cannot be detected are excluded with a
    /// failed Trace; later transactions of the same sender are excluded as
    /// cancelled.
    pub fn schedule_round(&self, txs: Vec<SignedTransaction>) -> ParallelGroup {
        if txs.is_empty() {
            return ParallelGroup::default();
        }
        let total = txs.len();
        let (admitted, excluded) = self.detect(txs);

        let component_sizes: Vec<usize> = {
            let lists: Vec<&[Address]> = admitted.iter().map(|d| d.accounts.as_slice()).collect();
            connected(&lists).iter().map(Vec::len).collect()
        };

        let layers = layer_by_nonce_rank(&admitted);
        let mut slots: Vec<Option<Detected>> = admitted.into_iter().map(Some).collect();
        let mut batches = Vec::with_capacity(layers.len());

        for layer in layers {
            let members = {
                let lists: Vec<&[Address]> = layer
                    .iter()
                    .map(|&i| slots[i].as_ref().map_or(&[][..], |d| d.accounts.as_slice()))
                    .collect();
                connected(&lists)
            };

            let jobs: Vec<Job> = members
                .into_iter()
                .map(|member| {
                    let mut txs = Vec::with_capacity(member.len());
                    let mut accounts = BTreeSet::new();
                    for m in member {
                        if let Some(d) = slots[layer[m]].take() {
                            accounts.extend(d.accounts);
                            txs.push(d.tx);
                        }
                    }
                    Job::new(txs, accounts)
                })
                .collect();

            let batch = Batch::new(merge(self.strategy, self.cores, jobs));
            debug!(
                batch = batches.len(),
                jobs = batch.len(),
                txs = batch.transaction_count(),
                "Planned batch"
            );
            batches.push(batch);
        }

        let group = ParallelGroup::new(batches, excluded, component_sizes);
        info!(
            "Grouped {} transactions into {} groups with sizes {:?}, {} batches, {} excluded",
            total,
            group.component_sizes().len(),
            group.component_sizes(),
            group.batches().len(),
            group.excluded().len()
        );
        group
    }

    fn detect(&self, txs: Vec<SignedTransaction>) -> (Vec<Detected>, Vec<(SignedTransaction, Trace)>) {
        let mut failed_from: HashMap<Address, Nonce> = HashMap::new();
        let mut outcomes = Vec::with_capacity(txs.len());
        for tx in txs {
            let outcome = self.detector.get_resources(&tx);
            if outcome.is_err() {
                let floor = failed_from.entry(tx.sender()).or_insert(tx.nonce());
                *floor = (*floor).min(tx.nonce());
            }
            outcomes.push((tx, outcome));
        }

        let mut admitted = Vec::with_capacity(outcomes.len());
        let mut excluded = Vec::new();
        for (tx, outcome) in outcomes {
            match outcome {
                Err(e) => {
                    let err = SchedulerError::ResourceDetection {
                        tx: tx.hash(),
                        reason: e.0,
                    };
                    warn!(sender = %tx.sender(), nonce = tx.nonce(), "{}", err);
                    let trace = Trace::failed(tx.hash(), FailureKind::Scheduling, err.to_string());
                    excluded.push((tx, trace));
                }
                Ok(_) if failed_from.get(&tx.sender()).is_some_and(|f| tx.nonce() > *f) => {
                    let trace = Trace::cancelled(
                        tx.hash(),
                        "an earlier transaction of this sender could not be scheduled",
                    );
                    excluded.push((tx, trace));
                }
                Ok(keys) => {
                    let mut accounts = vec![tx.sender()];
                    for key in keys {
                        let owner = key.owner();
                        if !accounts.contains(&owner) {
                            accounts.push(owner);
                        }
                    }
                    admitted.push(Detected { tx, accounts });
                }
            }
        }
        (admitted, excluded)
    }
}

/// Indices of `lists` grouped by connected account set, sets ordered by
/// their first member
fn connected(lists: &[&[Address]]) -> Vec<Vec<usize>> {
    let mut sets = AccountSets::new();
    for accounts in lists {
        sets.union_all(accounts);
    }

    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, accounts) in lists.iter().enumerate() {
        let Some(root) = accounts.first().and_then(|a| sets.root(a)) else {
            continue;
        };
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

/// Layer `k` lists, in input order, every transaction that is its
/// sender's `k`-th lowest nonce
fn layer_by_nonce_rank(admitted: &[Detected]) -> Vec<Vec<usize>> {
    let mut nonces: HashMap<Address, Vec<Nonce>> = HashMap::new();
    for d in admitted {
        nonces.entry(d.tx.sender()).or_default().push(d.tx.nonce());
    }
    for list in nonces.values_mut() {
        list.sort_unstable();
    }

    let mut layers: Vec<Vec<usize>> = Vec::new();
    for (i, d) in admitted.iter().enumerate() {
        let depth = nonces
            .get(&d.tx.sender())
            .and_then(|list| list.binary_search(&d.tx.nonce()).ok())
            .unwrap_or(0);
        if layers.len() <= depth {
            layers.resize_with(depth + 1, Vec::new);
        }
        layers[depth].push(i);
    }
    layers
}
