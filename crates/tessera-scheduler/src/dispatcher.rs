//! Round dispatch
//!
//! Batches run strictly one after another. The Jobs of a Batch run
//! concurrently, each on its own task, with at most `worker_count` of them
//! holding a worker. Inside a Job transactions run in order, each engine
//! call on the blocking pool. The round deadline is checked between calls
//! and bounds every call that is in flight.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_primitives::Address;
use tessera_types::{FailureKind, SignedTransaction, Trace};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info};

use crate::engine::{ExecutionEngine, StateCache, StateView};
use crate::error::SchedulerResult;
use crate::plan::{violation, Job, ParallelGroup};

const DEADLINE_REASON: &str = "round deadline reached";
const HALTED_REASON: &str = "an earlier transaction of this sender did not complete";

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Jobs that may hold a worker at once
    pub worker_count: usize,
    /// Round time limit in milliseconds
    pub round_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            round_timeout_ms: 4000,
        }
    }
}

impl DispatcherConfig {
    /// Round time limit
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

/// Outcome of one round
#[derive(Debug, Clone, Default)]
pub struct RoundExecution {
    /// One Trace per transaction of the group, excluded ones first
    pub traces: Vec<(SignedTransaction, Trace)>,
    /// Writes of every transaction that completed
    pub state_changes: StateCache,
    /// Batches that were started
    pub batches_run: usize,
    /// Whether the deadline cut the round short
    pub timed_out: bool,
}

struct JobContext {
    engine: Arc<dyn ExecutionEngine>,
    workers: Arc<Semaphore>,
    base: Arc<StateCache>,
    round: Arc<StateCache>,
    halted: HashSet<Address>,
    deadline: Instant,
    cancel: Arc<AtomicBool>,
}

impl JobContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire) || Instant::now() >= self.deadline
    }

    fn trip(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

struct JobOutcome {
    traces: Vec<(SignedTransaction, Trace)>,
    writes: StateCache,
}

/// Runs a [`ParallelGroup`] against an [`ExecutionEngine`]
pub struct ExecutionDispatcher {
    engine: Arc<dyn ExecutionEngine>,
    workers: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl ExecutionDispatcher {
    /// Create a dispatcher. A zero worker count is raised to one.
    pub fn new(engine: Arc<dyn ExecutionEngine>, config: DispatcherConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.worker_count.max(1)));
        Self {
            engine,
            workers,
            config,
        }
    }

    /// Configuration
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run `group` with the configured round timeout starting now
    pub async fn execute(
        &self,
        group: ParallelGroup,
        base: Arc<StateCache>,
    ) -> SchedulerResult<RoundExecution> {
        let deadline = Instant::now() + self.config.round_timeout();
        self.execute_round(group, deadline, base).await
    }

    /// Run `group` until done or until `deadline`.
    ///
    /// Every transaction of the group, planned or excluded, gets exactly
    /// one Trace. Fails without running anything if two Jobs of one Batch
    /// share an account, and aborts if two Jobs of one Batch write state
    /// owned by the same account.
    pub async fn execute_round(
        &self,
        group: ParallelGroup,
        deadline: Instant,
        base: Arc<StateCache>,
    ) -> SchedulerResult<RoundExecution> {
        group.validate()?;
        let total = group.scheduled_count() + group.excluded().len();
        let (batches, excluded) = group.into_parts();

        let mut halted: HashSet<Address> = excluded.iter().map(|(tx, _)| tx.sender()).collect();
        let mut traces = excluded;
        traces.reserve(total);
        let mut round = Arc::new(StateCache::new());
        let cancel = Arc::new(AtomicBool::new(false));
        let mut batches_run = 0;

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.load(Ordering::Acquire) || Instant::now() >= deadline {
                cancel.store(true, Ordering::Release);
                traces.extend(
                    batch
                        .into_jobs()
                        .into_iter()
                        .flat_map(Job::into_transactions)
                        .map(cancel_trace),
                );
                continue;
            }

            let jobs = batch.into_jobs();
            debug!(batch = index, jobs = jobs.len(), "Dispatching batch");
            let outcomes = {
                let ctx = Arc::new(JobContext {
                    engine: self.engine.clone(),
                    workers: self.workers.clone(),
                    base: base.clone(),
                    round: round.clone(),
                    halted: halted.clone(),
                    deadline,
                    cancel: cancel.clone(),
                });
                run_batch(ctx, jobs).await
            };
            batches_run += 1;

            let mut writer: HashMap<Address, usize> = HashMap::new();
            for (job, outcome) in outcomes.iter().enumerate() {
                for key in outcome.writes.keys() {
                    if let Some(&first_job) = writer.get(&key.owner()) {
                        if first_job != job {
                            return Err(violation(index, key.owner(), first_job, job));
                        }
                    }
                    writer.insert(key.owner(), job);
                }
            }

            for outcome in outcomes {
                if !outcome.writes.is_empty() {
                    Arc::make_mut(&mut round).extend(outcome.writes);
                }
                for (tx, trace) in outcome.traces {
                    if !trace.consumes_nonce() {
                        halted.insert(tx.sender());
                    }
                    traces.push((tx, trace));
                }
            }
        }

        let timed_out = cancel.load(Ordering::Acquire);
        let state_changes = Arc::try_unwrap(round).unwrap_or_else(|shared| (*shared).clone());
        info!(
            "Executed {} transactions in {} batches, {} succeeded{}",
            traces.len(),
            batches_run,
            traces.iter().filter(|(_, t)| t.is_success()).count(),
            if timed_out { ", round timed out" } else { "" }
        );
        Ok(RoundExecution {
            traces,
            state_changes,
            batches_run,
            timed_out,
        })
    }
}

/// Run the Jobs of one Batch concurrently, outcomes in Job order
async fn run_batch(ctx: Arc<JobContext>, jobs: Vec<Job>) -> Vec<JobOutcome> {
    let mut fallback: Vec<Vec<SignedTransaction>> = Vec::with_capacity(jobs.len());
    let mut set = JoinSet::new();
    for (i, job) in jobs.into_iter().enumerate() {
        let txs = job.into_transactions();
        fallback.push(txs.clone());
        let ctx = ctx.clone();
        set.spawn(async move { (i, run_job(ctx, txs).await) });
    }

    let mut outcomes: Vec<Option<JobOutcome>> = fallback.iter().map(|_| None).collect();
    let sleep = tokio::time::sleep_until(ctx.deadline);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                None => break,
                Some(Ok((i, outcome))) => outcomes[i] = Some(outcome),
                Some(Err(e)) => error!("Job task failed: {}", e),
            },
            _ = &mut sleep, if !ctx.cancel.load(Ordering::Acquire) => {
                debug!("Round deadline reached, cancelling jobs");
                ctx.trip();
            }
        }
    }

    outcomes
        .into_iter()
        .zip(fallback)
        .map(|(outcome, txs)| {
            outcome.unwrap_or_else(|| JobOutcome {
                traces: txs
                    .into_iter()
                    .map(|tx| {
                        let trace = Trace::failed(tx.hash(), FailureKind::System, "worker aborted");
                        (tx, trace)
                    })
                    .collect(),
                writes: StateCache::new(),
            })
        })
        .collect()
}

/// Run one Job's transactions in order
async fn run_job(ctx: Arc<JobContext>, txs: Vec<SignedTransaction>) -> JobOutcome {
    let mut traces = Vec::with_capacity(txs.len());
    let mut pending = txs.into_iter();

    let _permit = match timeout_at(ctx.deadline, ctx.workers.clone().acquire_owned()).await {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => {
            traces.extend(pending.map(|tx| {
                let trace = Trace::failed(tx.hash(), FailureKind::System, "worker pool closed");
                (tx, trace)
            }));
            return JobOutcome {
                traces,
                writes: StateCache::new(),
            };
        }
        Err(_) => {
            ctx.trip();
            traces.extend(pending.map(cancel_trace));
            return JobOutcome {
                traces,
                writes: StateCache::new(),
            };
        }
    };

    let mut writes = Arc::new(StateCache::new());
    let mut halted: HashSet<Address> = HashSet::new();

    while let Some(tx) = pending.next() {
        if ctx.cancelled() {
            ctx.trip();
            traces.push(cancel_trace(tx));
            traces.extend(pending.by_ref().map(cancel_trace));
            break;
        }
        if ctx.halted.contains(&tx.sender()) || halted.contains(&tx.sender()) {
            let trace = Trace::cancelled(tx.hash(), HALTED_REASON);
            traces.push((tx, trace));
            continue;
        }

        let call = {
            let engine = ctx.engine.clone();
            let base = ctx.base.clone();
            let round = ctx.round.clone();
            let job = writes.clone();
            let tx = tx.clone();
            tokio::task::spawn_blocking(move || {
                let view = StateView::new(&job, &round, &base);
                engine.execute(&tx, &view)
            })
        };

        match timeout_at(ctx.deadline, call).await {
            Err(_) => {
                // the call keeps running on its thread; its writes are dropped
                ctx.trip();
                traces.push(cancel_trace(tx));
                traces.extend(pending.by_ref().map(cancel_trace));
                break;
            }
            Ok(Err(e)) => {
                error!(sender = %tx.sender(), nonce = tx.nonce(), "Engine call aborted: {}", e);
                halted.insert(tx.sender());
                let trace = Trace::failed(tx.hash(), FailureKind::System, format!("engine aborted: {e}"));
                traces.push((tx, trace));
            }
            Ok(Ok(Ok(output))) => {
                Arc::make_mut(&mut writes).extend(output.writes);
                let trace = Trace::success(tx.hash(), output.return_value);
                traces.push((tx, trace));
            }
            Ok(Ok(Err(e))) => {
                debug!(sender = %tx.sender(), nonce = tx.nonce(), "Transaction reverted: {}", e);
                let trace = Trace::failed(tx.hash(), FailureKind::Execution, e.0);
                traces.push((tx, trace));
            }
        }
    }

    JobOutcome {
        traces,
        writes: Arc::try_unwrap(writes).unwrap_or_else(|shared| (*shared).clone()),
    }
}

fn cancel_trace(tx: SignedTransaction) -> (SignedTransaction, Trace) {
    let trace = Trace::cancelled(tx.hash(), DEADLINE_REASON);
    (tx, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ContractError, ExecutionOutput};
    use crate::plan::Batch;
    use bytes::Bytes;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use tessera_crypto::Signature;
    use tessera_types::{ResourceKey, TraceStatus, Transaction};

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn tx(from: u64, nonce: u64, to: u64, method: &str) -> SignedTransaction {
        SignedTransaction::new(Transaction::new(a(from), nonce, a(to), method), Signature::default())
    }

    fn job(txs: Vec<SignedTransaction>) -> Job {
        let accounts: BTreeSet<Address> = txs.iter().flat_map(|t| [t.sender(), t.to()]).collect();
        Job::new(txs, accounts)
    }

    fn counter_key(owner: Address) -> ResourceKey {
        ResourceKey::path(owner, "counter")
    }

    /// Increments a counter owned by the recipient. Method names select
    /// failures: `revert` fails, `panic` panics, `slow` sleeps.
    #[derive(Default)]
    struct CounterEngine {
        calls: AtomicUsize,
    }

    impl ExecutionEngine for CounterEngine {
        fn execute(
            &self,
            tx: &SignedTransaction,
            state: &StateView<'_>,
        ) -> Result<ExecutionOutput, ContractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match tx.method_name() {
                "revert" => return Err(ContractError("reverted".into())),
                "panic" => panic!("engine bug"),
                "slow" => std::thread::sleep(Duration::from_millis(300)),
                _ => {}
            }
            let key = counter_key(tx.to());
            let current = state
                .get(&key)
                .map(|b| u64::from_be_bytes(b[..8].try_into().unwrap()))
                .unwrap_or(0);
            let next = Bytes::copy_from_slice(&(current + 1).to_be_bytes());
            Ok(ExecutionOutput {
                return_value: next.clone(),
                writes: [(key, next)].into_iter().collect(),
            })
        }
    }

    fn dispatcher(engine: Arc<CounterEngine>) -> ExecutionDispatcher {
        ExecutionDispatcher::new(
            engine,
            DispatcherConfig {
                worker_count: 2,
                round_timeout_ms: 2000,
            },
        )
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn counter(state: &StateCache, owner: Address) -> Option<u64> {
        state
            .get(&counter_key(owner))
            .map(|b| u64::from_be_bytes(b[..8].try_into().unwrap()))
    }

    // ==================== Completion ====================

    #[tokio::test]
    async fn test_every_transaction_traced_once() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![
                Batch::new(vec![
                    job(vec![tx(1, 0, 2, "inc"), tx(2, 0, 1, "inc")]),
                    job(vec![tx(3, 0, 4, "inc")]),
                    job(vec![tx(5, 0, 6, "inc")]),
                ]),
                Batch::new(vec![job(vec![tx(1, 1, 2, "inc")])]),
            ],
            vec![],
            vec![3, 1, 1],
        );
        let expected: Vec<_> = group.transactions().map(SignedTransaction::hash).collect();

        let result = dispatcher(engine.clone())
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap();

        assert_eq!(result.traces.len(), expected.len());
        for hash in &expected {
            assert_eq!(result.traces.iter().filter(|(t, _)| t.hash() == *hash).count(), 1);
        }
        assert!(result.traces.iter().all(|(_, t)| t.is_success()));
        assert_eq!(result.batches_run, 2);
        assert!(!result.timed_out);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_later_batches_see_earlier_writes() {
        let engine = Arc::new(CounterEngine::default());
        let base: StateCache = [(counter_key(a(2)), Bytes::copy_from_slice(&10u64.to_be_bytes()))]
            .into_iter()
            .collect();
        let group = ParallelGroup::new(
            vec![
                Batch::new(vec![job(vec![tx(1, 0, 2, "inc"), tx(3, 0, 2, "inc")])]),
                Batch::new(vec![job(vec![tx(1, 1, 2, "inc")])]),
            ],
            vec![],
            vec![3],
        );

        let result = dispatcher(engine)
            .execute_round(group, far(), Arc::new(base))
            .await
            .unwrap();
        assert_eq!(counter(&result.state_changes, a(2)), Some(13));
        assert_eq!(result.traces[2].1.return_value, Bytes::copy_from_slice(&13u64.to_be_bytes()));
    }

    #[tokio::test]
    async fn test_empty_group() {
        let engine = Arc::new(CounterEngine::default());
        let result = dispatcher(engine)
            .execute(ParallelGroup::default(), Arc::new(StateCache::new()))
            .await
            .unwrap();
        assert!(result.traces.is_empty());
        assert_eq!(result.batches_run, 0);
    }

    // ==================== Failures ====================

    #[tokio::test]
    async fn test_revert_consumes_and_continues() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 0, 2, "revert"), tx(1, 1, 2, "inc")])])],
            vec![],
            vec![2],
        );
        let result = dispatcher(engine)
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap();

        assert_eq!(result.traces[0].1.status, TraceStatus::Failed(FailureKind::Execution));
        assert_eq!(result.traces[0].1.error.as_deref(), Some("reverted"));
        assert!(result.traces[1].1.is_success());
        assert_eq!(counter(&result.state_changes, a(2)), Some(1));
    }

    #[tokio::test]
    async fn test_engine_panic_halts_sender() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![
                Batch::new(vec![
                    job(vec![tx(1, 0, 2, "panic"), tx(1, 1, 2, "inc"), tx(3, 0, 2, "inc")]),
                    job(vec![tx(5, 0, 6, "inc")]),
                ]),
                Batch::new(vec![job(vec![tx(1, 2, 7, "inc")])]),
            ],
            vec![],
            vec![3, 1],
        );
        let result = dispatcher(engine)
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap();

        let status: Vec<TraceStatus> = result.traces.iter().map(|(_, t)| t.status).collect();
        assert_eq!(
            status,
            vec![
                TraceStatus::Failed(FailureKind::System),
                TraceStatus::Cancelled,
                TraceStatus::Success,
                TraceStatus::Success,
                TraceStatus::Cancelled,
            ]
        );
        assert_eq!(counter(&result.state_changes, a(7)), None);
        assert_eq!(counter(&result.state_changes, a(2)), Some(1));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_engine_panic_logged_as_error() {
        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 0, 2, "panic")])])],
            vec![],
            vec![1],
        );
        dispatcher(Arc::new(CounterEngine::default()))
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap();

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = output
            .lines()
            .find(|l| l.contains("Engine call aborted"))
            .unwrap();
        assert!(line.contains("ERROR"), "{line}");
    }

    #[tokio::test]
    async fn test_excluded_senders_do_not_run() {
        let engine = Arc::new(CounterEngine::default());
        let blocked = tx(1, 0, 2, "inc");
        let trace = Trace::failed(blocked.hash(), FailureKind::Scheduling, "no resources");
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 1, 2, "inc")]), job(vec![tx(3, 0, 4, "inc")])])],
            vec![(blocked.clone(), trace)],
            vec![1, 1],
        );
        let result = dispatcher(engine.clone())
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap();

        assert_eq!(result.traces[0].0, blocked);
        assert_eq!(result.traces[1].1.status, TraceStatus::Cancelled);
        assert!(result.traces[2].1.is_success());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_overlapping_jobs_rejected_before_running() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 0, 2, "inc")]), job(vec![tx(3, 0, 2, "inc")])])],
            vec![],
            vec![2],
        );
        let err = dispatcher(engine.clone())
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SchedulerError::ConcurrencyInvariantViolation { batch: 0, first_job: 0, second_job: 1, .. }
        ));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undeclared_write_overlap_aborts() {
        // both jobs write state owned by account 9 without declaring it
        struct SharedWriter;
        impl ExecutionEngine for SharedWriter {
            fn execute(
                &self,
                _tx: &SignedTransaction,
                _state: &StateView<'_>,
            ) -> Result<ExecutionOutput, ContractError> {
                Ok(ExecutionOutput {
                    return_value: Bytes::new(),
                    writes: [(counter_key(a(9)), Bytes::from_static(b"x"))].into_iter().collect(),
                })
            }
        }
        let dispatcher = ExecutionDispatcher::new(Arc::new(SharedWriter), DispatcherConfig::default());
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 0, 2, "w")]), job(vec![tx(3, 0, 4, "w")])])],
            vec![],
            vec![1, 1],
        );
        let err = dispatcher
            .execute_round(group, far(), Arc::new(StateCache::new()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SchedulerError::ConcurrencyInvariantViolation { account, .. } if account == a(9)
        ));
    }

    // ==================== Deadline ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_cancels_remaining_work() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![
                Batch::new(vec![
                    job(vec![tx(1, 0, 2, "slow"), tx(1, 1, 2, "inc")]),
                    job(vec![tx(3, 0, 4, "inc")]),
                ]),
                Batch::new(vec![job(vec![tx(3, 1, 4, "inc")])]),
            ],
            vec![],
            vec![2, 1],
        );
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = dispatcher(engine)
            .execute_round(group, deadline, Arc::new(StateCache::new()))
            .await
            .unwrap();

        assert!(result.timed_out);
        assert_eq!(result.traces.len(), 4);
        let status: Vec<TraceStatus> = result.traces.iter().map(|(_, t)| t.status).collect();
        assert_eq!(
            status,
            vec![
                TraceStatus::Cancelled,
                TraceStatus::Cancelled,
                TraceStatus::Success,
                TraceStatus::Cancelled,
            ]
        );
        // the slow call's write is discarded
        assert_eq!(counter(&result.state_changes, a(2)), None);
        assert_eq!(counter(&result.state_changes, a(4)), Some(1));
        assert_eq!(result.batches_run, 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_runs_nothing() {
        let engine = Arc::new(CounterEngine::default());
        let group = ParallelGroup::new(
            vec![Batch::new(vec![job(vec![tx(1, 0, 2, "inc")])])],
            vec![],
            vec![1],
        );
        let result = dispatcher(engine.clone())
            .execute_round(group, Instant::now(), Arc::new(StateCache::new()))
            .await
            .unwrap();
        assert!(result.timed_out);
        assert_eq!(result.traces[0].1.status, TraceStatus::Cancelled);
        assert_eq!(result.batches_run, 0);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }
}
