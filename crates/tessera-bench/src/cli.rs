//! CLI argument parsing for tessera-bench

use clap::Parser;
use std::path::PathBuf;

use crate::config::BenchConfig;

/// Drive a synthetic transfer workload through the round pipeline
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera-bench")]
#[command(about = "Tessera round pipeline benchmark")]
#[command(version)]
pub struct Cli {
    /// JSON config file (optional, defaults otherwise)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Number of funded accounts
    #[arg(long)]
    pub accounts: Option<usize>,

    /// Number of transactions to generate
    #[arg(long)]
    pub txs: Option<usize>,

    /// Probability that a transfer goes to a hot account
    #[arg(long)]
    pub conflict_ratio: Option<f64>,

    /// Worker count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Round timeout in milliseconds
    #[arg(long)]
    pub round_timeout_ms: Option<u64>,

    /// Stop after this many rounds
    #[arg(long, default_value = "1000")]
    pub max_rounds: u64,

    /// Write every Trace as JSON to this file
    #[arg(long)]
    pub traces: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Override `config` with the flags that were given
    pub fn apply(&self, config: &mut BenchConfig) {
        if let Some(accounts) = self.accounts {
            config.workload.accounts = accounts;
        }
        if let Some(txs) = self.txs {
            config.workload.tx_count = txs;
        }
        if let Some(ratio) = self.conflict_ratio {
            config.workload.conflict_ratio = ratio;
        }
        if let Some(workers) = self.workers {
            config.round.dispatcher.worker_count = workers;
        }
        if let Some(ms) = self.round_timeout_ms {
            config.round.dispatcher.round_timeout_ms = ms;
        }
    }
}
