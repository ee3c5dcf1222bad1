//! Prometheus-based metrics for the orchestrator.
//!
//! # Example
//!
//! ```ignore
//! use hodei_pipelines::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("failed to initialize metrics");
//! let text = export_metrics();
//! ```

pub mod prometheus;

pub use prometheus::{export_metrics, init_metrics, metrics_handler};

pub use prometheus::{
    ACTIVE_WORKERS, ASSIGNMENT_LATENCY, CONNECTED_WORKERS, EXECUTIONS_IN_PROGRESS, EXECUTIONS_TOTAL,
    REGISTRATION_TIMEOUTS_TOTAL, REGISTRY, SCHEDULING_DECISIONS_TOTAL, SCHEDULING_LATENCY,
};
