//! Configuration for the orchestrator and worker binaries.
//!
//! Every field is a `clap` argument with an `env` fallback, the same
//! `#[arg(long, env = "...")]` idiom the CLI layer used before this crate
//! took on its current shape.

use clap::Parser;

/// Default gRPC keepalive interval (spec.md §4.4).
const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Default keepalive ack timeout (spec.md §4.4).
const DEFAULT_KEEPALIVE_TIMEOUT_SECS: u64 = 5;

/// Default max connection age before a graceful reconnect is requested.
const DEFAULT_MAX_CONNECTION_AGE_SECS: u64 = 300;

/// Default grace period after max connection age before a hard close.
const DEFAULT_MAX_CONNECTION_AGE_GRACE_SECS: u64 = 60;

/// Default max inbound frame size: 4 MiB.
const DEFAULT_MAX_FRAME_SIZE_BYTES: u32 = 4 * 1024 * 1024;

/// Default max metadata size: 8 KiB.
const DEFAULT_MAX_METADATA_SIZE_BYTES: usize = 8 * 1024;

/// Default worker registration timeout (spec.md §4.6).
const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 30;

/// Default drain timeout on connection teardown (spec.md §4.4).
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 5;

/// Default scheduling strategy.
const DEFAULT_STRATEGY: &str = "least-loaded";

/// Configuration for the `orchestratord` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "orchestratord")]
#[command(about = "Runs the orchestrator's Worker Channel and scheduling services")]
#[command(version)]
pub struct OrchestratorConfig {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HODEI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Address the Worker Channel gRPC server binds to.
    #[arg(long, env = "HODEI_LISTEN_ADDR", default_value = "0.0.0.0:7070")]
    pub listen_addr: String,

    /// Scheduling strategy: round-robin, greedy-best-fit, least-loaded, bin-packing-first-fit.
    #[arg(long, env = "HODEI_SCHEDULING_STRATEGY", default_value = DEFAULT_STRATEGY)]
    pub scheduling_strategy: String,

    /// How long to wait for a provisioned worker to register before giving up.
    #[arg(long, env = "HODEI_REGISTRATION_TIMEOUT_SECS", default_value_t = DEFAULT_REGISTRATION_TIMEOUT_SECS)]
    pub registration_timeout_secs: u64,

    /// How long to wait for an in-flight execution_result to drain on disconnect.
    #[arg(long, env = "HODEI_DRAIN_TIMEOUT_SECS", default_value_t = DEFAULT_DRAIN_TIMEOUT_SECS)]
    pub drain_timeout_secs: u64,

    /// gRPC HTTP/2 keepalive interval, in seconds.
    #[arg(long, env = "HODEI_KEEPALIVE_SECS", default_value_t = DEFAULT_KEEPALIVE_SECS)]
    pub keepalive_secs: u64,

    /// gRPC HTTP/2 keepalive ack timeout, in seconds.
    #[arg(long, env = "HODEI_KEEPALIVE_TIMEOUT_SECS", default_value_t = DEFAULT_KEEPALIVE_TIMEOUT_SECS)]
    pub keepalive_timeout_secs: u64,

    /// Max connection age before a graceful reconnect is requested, in seconds.
    #[arg(long, env = "HODEI_MAX_CONNECTION_AGE_SECS", default_value_t = DEFAULT_MAX_CONNECTION_AGE_SECS)]
    pub max_connection_age_secs: u64,

    /// Grace period after max connection age before a hard close, in seconds.
    #[arg(long, env = "HODEI_MAX_CONNECTION_AGE_GRACE_SECS", default_value_t = DEFAULT_MAX_CONNECTION_AGE_GRACE_SECS)]
    pub max_connection_age_grace_secs: u64,

    /// Max inbound gRPC frame size, in bytes.
    #[arg(long, env = "HODEI_MAX_FRAME_SIZE_BYTES", default_value_t = DEFAULT_MAX_FRAME_SIZE_BYTES)]
    pub max_frame_size_bytes: u32,

    /// Max gRPC metadata size, in bytes.
    #[arg(long, env = "HODEI_MAX_METADATA_SIZE_BYTES", default_value_t = DEFAULT_MAX_METADATA_SIZE_BYTES)]
    pub max_metadata_size_bytes: usize,

    /// Address the `/metrics` Prometheus endpoint binds to.
    #[arg(long, env = "HODEI_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_addr: String,

    /// Container image used to provision Docker-backed workers.
    #[arg(long, env = "HODEI_WORKER_IMAGE", default_value = "hodei/worker:latest")]
    pub worker_image: String,
}

/// Configuration for the `hodei-worker` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "hodei-worker")]
#[command(about = "Connects to an orchestrator and executes assigned work")]
#[command(version)]
pub struct WorkerConfig {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "HODEI_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// This worker's id, assigned by the orchestrator at provisioning time.
    #[arg(long, env = "HODEI_WORKER_ID")]
    pub worker_id: String,

    /// The orchestrator's Worker Channel endpoint, e.g. `http://orchestrator:7070`.
    #[arg(long, env = "HODEI_CHANNEL_ENDPOINT")]
    pub channel_endpoint: String,
}

/// Parses `RUST_LOG`, falling back to `log_level`, matching the
/// orchestrator's env-var-first, CLI-flag-second precedence.
pub fn resolve_log_filter(log_level: &str) -> String {
    std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string())
}
