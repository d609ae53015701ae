//! Configuration types for tessera-bench

use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::RoundConfig;
use tessera_txpool::PoolConfig;

/// Full benchmark configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Pool limits
    pub pool: PoolConfig,
    /// Round pipeline
    pub round: RoundConfig,
    /// Generated workload
    pub workload: WorkloadConfig,
}

/// Shape of the generated workload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Funded accounts, each with its own key
    pub accounts: usize,
    /// Transfers to generate
    pub tx_count: usize,
    /// Probability that a recipient is drawn from the hot set
    pub conflict_ratio: f64,
    /// Size of the hot set
    pub hot_accounts: usize,
    /// Starting balance of every account
    pub initial_balance: u64,
    /// Simulated engine work per call, in microseconds
    pub work_micros: u64,
    /// RNG seed
    pub seed: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            accounts: 1000,
            tx_count: 10_000,
            conflict_ratio: 0.1,
            hot_accounts: 4,
            initial_balance: 1_000_000,
            work_micros: 0,
            seed: 7,
        }
    }
}

/// Load a configuration file
pub fn load_config(path: &Path) -> anyhow::Result<BenchConfig> {
    tracing::info!("Loading config from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let config: BenchConfig = serde_json::from_str(&content)?;
    Ok(config)
}
