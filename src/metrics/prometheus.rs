//! Prometheus metrics registration and export.
//!
//! Defines the orchestrator's observable surface: worker pool health,
//! execution outcomes, scheduling decisions, and assignment latency.

use prometheus::{Counter, CounterVec, Encoder, Gauge, Histogram, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all orchestrator metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Number of workers currently registered with the orchestrator.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Number of workers with a live gRPC connection to the Worker Channel.
pub static CONNECTED_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Number of executions currently in a non-terminal state.
pub static EXECUTIONS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Total executions reaching a terminal state, labeled by outcome
/// (`completed`, `failed`, `cancelled`).
pub static EXECUTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total scheduling decisions made, labeled by the strategy that made them.
pub static SCHEDULING_DECISIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Time from scheduling decision to worker registration, in seconds.
pub static ASSIGNMENT_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Time spent evaluating candidate pools per scheduling decision, labeled
/// by strategy.
pub static SCHEDULING_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Total worker registration timeouts observed (spec.md §4.6 step 2).
pub static REGISTRATION_TIMEOUTS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Initializes all metrics and registers them with the registry.
///
/// Idempotent: a second call after a successful first call is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let active_workers = Gauge::new("hodei_active_workers", "Number of workers currently registered")?;
    let connected_workers = Gauge::new("hodei_connected_workers", "Number of workers with a live channel connection")?;
    let executions_in_progress = Gauge::new("hodei_executions_in_progress", "Executions currently in a non-terminal state")?;

    let executions_total = CounterVec::new(
        Opts::new("hodei_executions_total", "Total executions reaching a terminal state"),
        &["outcome"],
    )?;

    let scheduling_decisions_total = CounterVec::new(
        Opts::new("hodei_scheduling_decisions_total", "Total scheduling decisions made"),
        &["strategy"],
    )?;

    let assignment_latency = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "hodei_assignment_latency_seconds",
            "Time from scheduling decision to worker registration",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )?;

    let scheduling_latency = HistogramVec::new(
        prometheus::HistogramOpts::new("hodei_scheduling_latency_seconds", "Time spent selecting a pool")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["strategy"],
    )?;

    let registration_timeouts_total =
        Counter::new("hodei_registration_timeouts_total", "Total worker registration timeouts")?;

    registry.register(Box::new(active_workers.clone()))?;
    registry.register(Box::new(connected_workers.clone()))?;
    registry.register(Box::new(executions_in_progress.clone()))?;
    registry.register(Box::new(executions_total.clone()))?;
    registry.register(Box::new(scheduling_decisions_total.clone()))?;
    registry.register(Box::new(assignment_latency.clone()))?;
    registry.register(Box::new(scheduling_latency.clone()))?;
    registry.register(Box::new(registration_timeouts_total.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = ACTIVE_WORKERS.set(active_workers);
    let _ = CONNECTED_WORKERS.set(connected_workers);
    let _ = EXECUTIONS_IN_PROGRESS.set(executions_in_progress);
    let _ = EXECUTIONS_TOTAL.set(executions_total);
    let _ = SCHEDULING_DECISIONS_TOTAL.set(scheduling_decisions_total);
    let _ = ASSIGNMENT_LATENCY.set(assignment_latency);
    let _ = SCHEDULING_LATENCY.set(scheduling_latency);
    let _ = REGISTRATION_TIMEOUTS_TOTAL.set(registration_timeouts_total);

    tracing::info!("prometheus metrics initialized");

    Ok(())
}

/// Exports all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {e}\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {e}\n"))
}

/// HTTP handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}
