//! Orchestrator daemon: the Worker Channel's gRPC endpoint plus scheduling
//! and execution services.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hodei_pipelines::channel::proto::worker_channel_server::WorkerChannelServer;
use hodei_pipelines::channel::WorkerChannelHub;
use hodei_pipelines::config::{resolve_log_filter, OrchestratorConfig};
use hodei_pipelines::events::EventBus;
use hodei_pipelines::execution::ExecutionEngine;
use hodei_pipelines::metrics::init_metrics;
use hodei_pipelines::repository::{InMemoryJobRepository, InMemoryTemplateRepository};
use hodei_pipelines::scheduler::strategy_from_name;
use hodei_pipelines::worker::{DockerWorkerFactory, WorkerRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OrchestratorConfig::parse();

    let log_filter = resolve_log_filter(&config.log_level);
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    init_metrics()?;

    let job_repository = Arc::new(InMemoryJobRepository::new());
    let template_repository = Arc::new(InMemoryTemplateRepository::new());
    let worker_registry = Arc::new(WorkerRegistry::new());
    let strategy = strategy_from_name(&config.scheduling_strategy);
    let events = Arc::new(EventBus::new());

    let worker_factory = Arc::new(DockerWorkerFactory::connect_local(
        config.worker_image.clone(),
        format!("http://{}", config.listen_addr),
    )?);

    let engine = Arc::new(
        ExecutionEngine::new(job_repository, template_repository, worker_factory, worker_registry.clone(), strategy, events)
            .with_registration_timeout(Duration::from_secs(config.registration_timeout_secs)),
    );

    let hub = WorkerChannelHub::new(engine.clone(), worker_registry);
    engine.set_transport(Arc::new(hub.clone())).await;

    tracing::info!(
        listen_addr = %config.listen_addr,
        strategy = %config.scheduling_strategy,
        "starting orchestratord"
    );

    let addr = config.listen_addr.parse()?;

    // Only the keepalive/frame-size parameters tonic's transport builder
    // exposes directly are wired here (spec.md §4.4); max connection age
    // and max metadata size have no native tonic lever and are left as
    // documented config fields (see DESIGN.md).
    tonic::transport::Server::builder()
        .http2_keepalive_interval(Some(Duration::from_secs(config.keepalive_secs)))
        .http2_keepalive_timeout(Some(Duration::from_secs(config.keepalive_timeout_secs)))
        .max_frame_size(Some(config.max_frame_size_bytes))
        .add_service(WorkerChannelServer::new(hub))
        .serve(addr)
        .await?;

    Ok(())
}
