//! Scheduling: ranking resource pools for a job.
//!
//! This module provides two collaborating pieces:
//!
//! - [`evaluator`]: the Pool Candidate Evaluator (C1), which turns live
//!   utilization snapshots plus a job's resource requirements into the list
//!   of pools that can actually host the job.
//! - [`strategy`]: the four pluggable ranking policies (C2) that pick a
//!   single pool out of that candidate list.
//!
//! # Example
//!
//! ```rust,ignore
//! use hodei_pipelines::scheduler::{evaluator, strategy::LeastLoaded, strategy::SchedulingStrategy};
//!
//! let candidates = evaluator::candidates_for(&job, &pools, &utilizations);
//! let strategy = LeastLoaded::default();
//! let chosen = strategy.select_pool(&job, &candidates)?;
//! ```

pub mod evaluator;
pub mod monitor;
pub mod strategy;

pub use evaluator::candidates_for;
pub use monitor::{InMemoryResourceMonitor, ResourceMonitor};
pub use strategy::{
    BinPackingFirstFit, GreedyBestFit, LeastLoaded, RoundRobin, SchedulingStrategy,
};

/// Resolves a configured strategy name (e.g. `HODEI_SCHEDULING_STRATEGY`)
/// to a concrete [`SchedulingStrategy`]. Unrecognized names fall back to
/// `least-loaded`, logging a warning rather than failing startup.
pub fn strategy_from_name(name: &str) -> std::sync::Arc<dyn SchedulingStrategy> {
    match name {
        "round-robin" => std::sync::Arc::new(RoundRobin::new()),
        "greedy-best-fit" => std::sync::Arc::new(GreedyBestFit::new()),
        "bin-packing-first-fit" => std::sync::Arc::new(BinPackingFirstFit::new()),
        "least-loaded" => std::sync::Arc::new(LeastLoaded::new()),
        other => {
            tracing::warn!(strategy = other, "unrecognized scheduling strategy, defaulting to least-loaded");
            std::sync::Arc::new(LeastLoaded::new())
        }
    }
}
