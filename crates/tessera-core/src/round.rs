//! Round coordinator

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tessera_scheduler::{
    Batch, ConflictGrouper, ExecutionDispatcher, ExecutionEngine, ParallelGroup,
    ResourceUsageDetector, RoundExecution, StateCache,
};
use tessera_txpool::{Settlement, TxPool};
use tessera_types::{ResourceKey, SignedTransaction, Trace, TraceStatus};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::RoundConfig;
use crate::error::RoundResult;

/// Summary of one round
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    /// Round number, starting at 1
    pub round: u64,
    /// One Trace per drained transaction
    pub traces: Vec<(SignedTransaction, Trace)>,
    /// State written by the round
    pub state_changes: StateCache,
    /// Sizes of the connected account groups
    pub group_sizes: Vec<usize>,
    /// Job sizes of each Batch
    pub batches: Vec<Vec<usize>>,
    /// What settlement did to the pool
    pub settlement: Settlement,
    /// Wall time of the round
    pub elapsed: Duration,
    /// Whether the deadline cut the round short
    pub timed_out: bool,
}

impl RoundReport {
    fn count(&self, pred: impl Fn(&TraceStatus) -> bool) -> usize {
        self.traces.iter().filter(|(_, t)| pred(&t.status)).count()
    }

    /// Transactions that succeeded
    pub fn succeeded(&self) -> usize {
        self.count(|s| *s == TraceStatus::Success)
    }

    /// Transactions that failed
    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TraceStatus::Failed(_)))
    }

    /// Transactions that were cancelled
    pub fn cancelled(&self) -> usize {
        self.count(|s| *s == TraceStatus::Cancelled)
    }

    /// True if the round had nothing to run
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}

/// Drives rounds: drain, group, execute, settle
pub struct RoundCoordinator {
    pool: Arc<TxPool>,
    grouper: ConflictGrouper,
    dispatcher: ExecutionDispatcher,
    config: RoundConfig,
    /// committed state
    world: Mutex<Arc<StateCache>>,
    round: AtomicU64,
    /// held for the whole of `run_round`
    running: tokio::sync::Mutex<()>,
}

impl RoundCoordinator {
    /// Create a coordinator over `pool`
    pub fn new(
        pool: Arc<TxPool>,
        detector: Arc<dyn ResourceUsageDetector>,
        engine: Arc<dyn ExecutionEngine>,
        config: RoundConfig,
    ) -> RoundResult<Self> {
        let grouper = ConflictGrouper::new(detector, config.grouper.clone())?;
        let dispatcher = ExecutionDispatcher::new(engine, config.dispatcher.clone());
        Ok(Self {
            pool,
            grouper,
            dispatcher,
            config,
            world: Mutex::new(Arc::new(StateCache::new())),
            round: AtomicU64::new(0),
            running: tokio::sync::Mutex::new(()),
        })
    }

    /// Start from `state` instead of an empty world
    pub fn with_genesis(self, state: StateCache) -> Self {
        *self.world.lock() = Arc::new(state);
        self
    }

    /// The pool
    pub fn pool(&self) -> &Arc<TxPool> {
        &self.pool
    }

    /// Configuration
    pub fn config(&self) -> &RoundConfig {
        &self.config
    }

    /// Rounds started so far
    pub fn rounds(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    /// Snapshot of committed state
    pub fn state(&self) -> Arc<StateCache> {
        self.world.lock().clone()
    }

    /// Committed value of `key`
    pub fn get_state(&self, key: &ResourceKey) -> Option<Bytes> {
        self.world.lock().get(key).cloned()
    }

    /// Plan `txs` without running them
    pub fn schedule_round(&self, txs: Vec<SignedTransaction>) -> ParallelGroup {
        self.grouper.schedule_round(txs)
    }

    /// Run a plan against committed state, with the configured timeout
    pub async fn execute_round(&self, group: ParallelGroup) -> RoundResult<RoundExecution> {
        let deadline = Instant::now() + self.dispatcher.config().round_timeout();
        Ok(self
            .dispatcher
            .execute_round(group, deadline, self.state())
            .await?)
    }

    /// Run one full round.
    ///
    /// On error every drained transaction is settled as cancelled, so the
    /// pool gets them back and no nonce moves. Concurrent callers are
    /// serialised, so each round sees the state committed by the last.
    pub async fn run_round(&self) -> RoundResult<RoundReport> {
        let _running = self.running.lock().await;
        let started = Instant::now();
        let deadline = started + self.dispatcher.config().round_timeout();
        let round = self.round.fetch_add(1, Ordering::AcqRel) + 1;

        let ready = self.pool.ready_transactions(self.config.ready_limit);
        if ready.is_empty() {
            return Ok(RoundReport {
                round,
                ..RoundReport::default()
            });
        }
        let drained = ready.clone();

        let group = self.grouper.schedule_round(ready);
        let group_sizes = group.component_sizes().to_vec();
        let batches: Vec<Vec<usize>> = group.batches().iter().map(Batch::job_sizes).collect();

        let execution = match self
            .dispatcher
            .execute_round(group, deadline, self.state())
            .await
        {
            Ok(execution) => execution,
            Err(e) => {
                error!(round, "Round aborted: {}", e);
                let reason = format!("round aborted: {e}");
                let traces: Vec<_> = drained
                    .into_iter()
                    .map(|tx| {
                        let trace = Trace::cancelled(tx.hash(), reason.clone());
                        (tx, trace)
                    })
                    .collect();
                self.pool.settle(&traces);
                return Err(e.into());
            }
        };

        let settlement = self.pool.settle(&execution.traces);
        if !execution.state_changes.is_empty() {
            let mut world = self.world.lock();
            Arc::make_mut(&mut *world).extend(
                execution
                    .state_changes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }

        let report = RoundReport {
            round,
            traces: execution.traces,
            state_changes: execution.state_changes,
            group_sizes,
            batches,
            settlement,
            elapsed: started.elapsed(),
            timed_out: execution.timed_out,
        };
        info!(
            "Round {} finished in {:?}: {} succeeded, {} failed, {} cancelled, {} requeued",
            round,
            report.elapsed,
            report.succeeded(),
            report.failed(),
            report.cancelled(),
            report.settlement.requeued
        );
        Ok(report)
    }
}
