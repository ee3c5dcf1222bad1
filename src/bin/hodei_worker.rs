//! Worker process entry point: connects to an orchestrator's Worker
//! Channel and executes whatever it is assigned.

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hodei_pipelines::config::{resolve_log_filter, WorkerConfig};
use hodei_pipelines::runtime::{run, WorkerRuntimeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::parse();

    let log_filter = resolve_log_filter(&config.log_level);
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    tracing::info!(worker_id = %config.worker_id, endpoint = %config.channel_endpoint, "starting hodei-worker");

    run(WorkerRuntimeConfig {
        worker_id: config.worker_id,
        orchestrator_endpoint: config.channel_endpoint,
    })
    .await?;

    Ok(())
}
