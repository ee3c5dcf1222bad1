//! Scheduling Strategies (C2): four pluggable policies for picking one
//! pool out of a candidate list.
//!
//! All four share one capability — `select_pool` + `name` — so adding a
//! fifth strategy is just registering another instance behind
//! `Arc<dyn SchedulingStrategy>` (spec.md §9, "Dynamic dispatch").

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::SchedulingError;
use crate::model::{Job, PoolCandidate, ResourcePool};

use super::evaluator::{parse_cpu, parse_memory};

/// Shared contract for all ranking policies.
pub trait SchedulingStrategy: Send + Sync {
    /// Picks one pool out of `candidates`. An empty candidate list is
    /// always an error (spec.md §4.2).
    fn select_pool(&self, job: &Job, candidates: &[PoolCandidate]) -> Result<ResourcePool, SchedulingError>;

    /// Human-readable strategy name, for logging/metrics labels.
    fn name(&self) -> &'static str;
}

fn sorted_by_pool_id(candidates: &[PoolCandidate]) -> Vec<&PoolCandidate> {
    let mut sorted: Vec<&PoolCandidate> = candidates.iter().collect();
    sorted.sort_by(|a, b| a.pool.id.cmp(&b.pool.id));
    sorted
}

/// Picks candidates round-robin by ascending pool id. The counter is
/// per-instance and safe under parallel scheduling (P5).
#[derive(Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingStrategy for RoundRobin {
    fn select_pool(&self, _job: &Job, candidates: &[PoolCandidate]) -> Result<ResourcePool, SchedulingError> {
        if candidates.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        let sorted = sorted_by_pool_id(candidates);
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % sorted.len();
        Ok(sorted[index].pool.clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Picks the least-used pool that still fits, by mean CPU/memory
/// utilization.
#[derive(Default)]
pub struct GreedyBestFit;

impl GreedyBestFit {
    pub fn new() -> Self {
        Self
    }

    fn score(candidate: &PoolCandidate) -> f64 {
        let cpu = candidate.utilization.cpu_utilization();
        let mem = candidate.utilization.memory_utilization();
        (cpu + mem) / 2.0
    }
}

impl SchedulingStrategy for GreedyBestFit {
    fn select_pool(&self, _job: &Job, candidates: &[PoolCandidate]) -> Result<ResourcePool, SchedulingError> {
        if candidates.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        candidates
            .iter()
            .min_by(|a, b| {
                Self::score(a)
                    .partial_cmp(&Self::score(b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| c.pool.clone())
            .ok_or_else(|| SchedulingError::SelectionFailed("no candidate scored".to_string()))
    }

    fn name(&self) -> &'static str {
        "greedy_best_fit"
    }
}

/// Weighted combination of availability, job-capacity headroom, queue
/// depth, and fit-to-request. Weights are fixed by spec.md §4.2 and must
/// not be tuned per-deployment.
#[derive(Default)]
pub struct LeastLoaded;

impl LeastLoaded {
    pub fn new() -> Self {
        Self
    }

    fn job_capacity_score(candidate: &PoolCandidate) -> f64 {
        let running = candidate.utilization.running_jobs as f64;
        match candidate.pool.max_concurrent_jobs {
            Some(max) if max > 0 => (1.0 - running / max as f64).max(0.0),
            _ => 1.0 / (1.0 + 0.1 * running),
        }
    }

    fn queue_score(candidate: &PoolCandidate) -> f64 {
        1.0 / (1.0 + 0.2 * candidate.utilization.queued_jobs as f64)
    }

    fn fit_score(available: f64, required: f64) -> f64 {
        if required > 0.0 {
            (available / required).min(1.0)
        } else {
            1.0
        }
    }

    fn score(job: &Job, candidate: &PoolCandidate) -> f64 {
        let required_cpu = job
            .resource_requirements
            .get("cpu")
            .map(|s| parse_cpu(s))
            .unwrap_or(0.0);
        let required_memory = job
            .resource_requirements
            .get("memory")
            .map(|s| parse_memory(s) as f64)
            .unwrap_or(0.0);

        let cpu_availability = 1.0 - candidate.utilization.cpu_utilization();
        let mem_availability = 1.0 - candidate.utilization.memory_utilization();
        let job_capacity = Self::job_capacity_score(candidate);
        let queue = Self::queue_score(candidate);
        let cpu_fit = Self::fit_score(candidate.utilization.available_cpu(), required_cpu);
        let mem_fit = Self::fit_score(
            candidate.utilization.available_memory_bytes() as f64,
            required_memory,
        );

        0.25 * cpu_availability
            + 0.25 * mem_availability
            + 0.20 * job_capacity
            + 0.10 * queue
            + 0.10 * cpu_fit
            + 0.10 * mem_fit
    }
}

impl SchedulingStrategy for LeastLoaded {
    fn select_pool(&self, job: &Job, candidates: &[PoolCandidate]) -> Result<ResourcePool, SchedulingError> {
        if candidates.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        candidates
            .iter()
            .max_by(|a, b| {
                Self::score(job, a)
                    .partial_cmp(&Self::score(job, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|c| c.pool.clone())
            .ok_or_else(|| SchedulingError::SelectionFailed("no candidate scored".to_string()))
    }

    fn name(&self) -> &'static str {
        "least_loaded"
    }
}

/// Packs onto already-used pools rather than spreading load, subject to a
/// piecewise preference curve that avoids both near-empty and near-full
/// pools.
#[derive(Default)]
pub struct BinPackingFirstFit;

impl BinPackingFirstFit {
    pub fn new() -> Self {
        Self
    }

    fn packing_score(candidate: &PoolCandidate) -> f64 {
        let avg_util = (candidate.utilization.cpu_utilization() + candidate.utilization.memory_utilization()) / 2.0;
        if avg_util < 0.1 {
            avg_util * 0.5
        } else if avg_util < 0.7 {
            avg_util
        } else if avg_util < 0.9 {
            avg_util * 0.8
        } else {
            avg_util * 0.5
        }
    }
}

impl SchedulingStrategy for BinPackingFirstFit {
    fn select_pool(&self, _job: &Job, candidates: &[PoolCandidate]) -> Result<ResourcePool, SchedulingError> {
        if candidates.is_empty() {
            return Err(SchedulingError::NoCandidates);
        }
        let mut scored: Vec<(&PoolCandidate, f64)> = candidates
            .iter()
            .map(|c| (c, Self::packing_score(c)))
            .collect();
        // Stable sort: ties keep input order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .first()
            .map(|(c, _)| c.pool.clone())
            .ok_or_else(|| SchedulingError::SelectionFailed("no candidate scored".to_string()))
    }

    fn name(&self) -> &'static str {
        "bin_packing_first_fit"
    }
}
