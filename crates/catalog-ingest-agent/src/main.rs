//! # Catalog Ingest Agent
//!
//! Watches an inbox directory and runs every uploaded CSV file through the
//! catalog reconciler.
//!
//! ## Architecture
//!
//! The agent is a single polling loop:
//! 1. **Scan**: lists `*.csv` files in the inbox, in name order
//! 2. **Invoke**: runs one blocking invocation per file, one session each
//! 3. **Archive**: moves the file to `processed/` or `failed/`, or leaves
//!    it in place when the store was unreachable

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting catalog ingest agent"
    );

    // Load configuration
    let config = AgentConfig::from_env()?;

    let agent = Agent::new(config)?;

    agent.run().await?;

    Ok(())
}
