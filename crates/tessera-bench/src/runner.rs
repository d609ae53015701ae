//! Runs a workload through the round pipeline

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tessera_core::{RoundCoordinator, RoundReport};
use tessera_primitives::{Address, Nonce, H256};
use tessera_scheduler::AccountResourceDetector;
use tessera_txpool::{InMemoryAccountContext, TxPool};
use tessera_types::TraceStatus;
use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::workload::{TransferEngine, Workload};

/// One Trace as written to the traces file
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    /// Round that produced it
    pub round: u64,
    /// Transaction hash
    pub tx_hash: H256,
    /// Sender
    pub sender: Address,
    /// Sender nonce
    pub nonce: Nonce,
    /// Outcome
    pub status: TraceStatus,
    /// Failure or cancellation reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceRecord {
    fn from_report(report: &RoundReport) -> impl Iterator<Item = TraceRecord> + '_ {
        report.traces.iter().map(|(tx, trace)| TraceRecord {
            round: report.round,
            tx_hash: tx.hash(),
            sender: tx.sender(),
            nonce: tx.nonce(),
            status: trace.status,
            error: trace.error.clone(),
        })
    }
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Transactions generated
    pub generated: usize,
    /// Rejected on admission
    pub rejected: usize,
    /// Rounds run
    pub rounds: u64,
    /// Rounds cut short by the deadline
    pub timed_out_rounds: u64,
    /// Succeeded traces
    pub succeeded: usize,
    /// Failed traces
    pub failed: usize,
    /// Cancelled traces
    pub cancelled: usize,
    /// Left in the pool at the end
    pub remaining: usize,
    /// Wall time spent in rounds, in milliseconds
    pub elapsed_ms: u128,
    /// Completed transactions per second
    pub tps: f64,
}

/// Generate the configured workload and run rounds until the pool drains
/// or `max_rounds` is reached
pub async fn run(config: &BenchConfig, max_rounds: u64) -> anyhow::Result<(Summary, Vec<TraceRecord>)> {
    let workload = Workload::generate(&config.workload)?;
    info!(
        "Generated {} transfers over {} accounts",
        workload.transactions.len(),
        workload.accounts.len()
    );

    let pool = Arc::new(TxPool::new(
        config.pool.clone(),
        Arc::new(InMemoryAccountContext::new()),
    ));
    let engine = Arc::new(TransferEngine::new(Duration::from_micros(
        config.workload.work_micros,
    )));
    let coordinator = RoundCoordinator::new(
        pool.clone(),
        Arc::new(AccountResourceDetector),
        engine,
        config.round.clone(),
    )?
    .with_genesis(workload.genesis(config.workload.initial_balance));

    let mut summary = Summary {
        generated: workload.transactions.len(),
        ..Summary::default()
    };
    for tx in workload.transactions {
        if let Err(e) = pool.enqueue(tx) {
            warn!("Transaction rejected: {}", e);
            summary.rejected += 1;
        }
    }

    let mut records = Vec::new();
    let started = Instant::now();
    while !pool.is_empty() && summary.rounds < max_rounds {
        let report = coordinator.run_round().await?;
        if report.is_empty() {
            warn!("Pool holds {} transactions but none are executable", pool.len());
            break;
        }
        summary.rounds += 1;
        summary.timed_out_rounds += u64::from(report.timed_out);
        summary.succeeded += report.succeeded();
        summary.failed += report.failed();
        summary.cancelled += report.cancelled();
        records.extend(TraceRecord::from_report(&report));
    }
    let elapsed = started.elapsed();

    summary.remaining = pool.len();
    summary.elapsed_ms = elapsed.as_millis();
    let completed = (summary.succeeded + summary.failed) as f64;
    summary.tps = if elapsed.is_zero() {
        0.0
    } else {
        completed / elapsed.as_secs_f64()
    };
    info!(
        "Ran {} rounds in {:?}: {} succeeded, {} failed, {} cancelled, {:.0} tx/s",
        summary.rounds, elapsed, summary.succeeded, summary.failed, summary.cancelled, summary.tps
    );
    Ok((summary, records))
}
