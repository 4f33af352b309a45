//! Consensus Node Binary
//!
//! Runs a single validator over an in-memory ledger. Transactions are read
//! from stdin as one JSON document per line; each line produces one JSON
//! outcome on stdout.

use anyhow::Context;
use asset_ledger::InMemoryStore;
use consensus::{Config, ConsensusDriver};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries outcomes
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting consensus node");

    // Load configuration
    let config = match std::env::args().nth(1).or_else(|| std::env::var("CONSENSUS_CONFIG").ok()) {
        Some(config_path) => {
            info!("Loading config from: {}", config_path);
            Config::from_file(&config_path)
                .with_context(|| format!("loading config {}", config_path))?
        }
        None => {
            info!("Loading config from environment variables");
            Config::from_env()?
        }
    };

    let keypair = config.keypair()?;
    let store = Arc::new(InMemoryStore::new());
    let driver = ConsensusDriver::new(store, keypair, &config)?;

    info!(node_id = %config.node_id, validator = %driver.validator_id(), "Consensus node running");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let outcome = driver.submit_json(&line).await;
                println!("{}", serde_json::to_string(&outcome)?);
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(err) => error!("Unable to listen for shutdown signal: {}", err),
                }
                break;
            }
        }
    }

    let metrics = driver.metrics();
    info!(
        validated = metrics.transactions_validated.get(),
        blocks = metrics.blocks_written.get(),
        conflicts = metrics.commit_conflicts.get(),
        "Consensus node stopped"
    );
    Ok(())
}
