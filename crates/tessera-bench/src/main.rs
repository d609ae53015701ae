//! Tessera round pipeline benchmark
//!
//! Generates signed transfers, admits them into a pool and runs execution
//! rounds until the pool is empty.

mod cli;
mod config;
mod runner;
mod workload;

use anyhow::Result;
use cli::Cli;
use config::{load_config, BenchConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    tracing::info!("Tessera bench starting...");

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BenchConfig::default(),
    };
    cli.apply(&mut config);

    let (summary, records) = runner::run(&config, cli.max_rounds).await?;

    if let Some(path) = &cli.traces {
        std::fs::write(path, serde_json::to_vec_pretty(&records)?)?;
        tracing::info!("Wrote {} traces to {:?}", records.len(), path);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
