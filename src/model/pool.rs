//! Resource pools and the utilization snapshots the scheduler ranks them by.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A backend capable of hosting workers (Docker, Kubernetes, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: String,
    pub name: String,
    /// Backend tag, e.g. `"docker"`, `"kubernetes"`.
    pub pool_type: String,
    /// Free-form capacity description (informational only; the capacity
    /// predicate in [`crate::scheduler::evaluator`] uses
    /// [`ResourceUtilization`] instead).
    pub capacity_description: String,
    pub max_concurrent_jobs: Option<u32>,
}

impl ResourcePool {
    pub fn new(id: impl Into<String>, name: impl Into<String>, pool_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pool_type: pool_type.into(),
            capacity_description: String::new(),
            max_concurrent_jobs: None,
        }
    }

    pub fn with_max_concurrent_jobs(mut self, max: u32) -> Self {
        self.max_concurrent_jobs = Some(max);
        self
    }
}

/// A point-in-time resource snapshot for a pool, produced on demand by a
/// [`crate::scheduler::monitor::ResourceMonitor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub pool_id: String,
    pub total_cpu: f64,
    pub used_cpu: f64,
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub running_jobs: u32,
    pub queued_jobs: u32,
    pub timestamp: DateTime<Utc>,
}

impl ResourceUtilization {
    pub fn new(pool_id: impl Into<String>) -> Self {
        Self {
            pool_id: pool_id.into(),
            total_cpu: 0.0,
            used_cpu: 0.0,
            total_memory_bytes: 0,
            used_memory_bytes: 0,
            running_jobs: 0,
            queued_jobs: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn available_cpu(&self) -> f64 {
        (self.total_cpu - self.used_cpu).max(0.0)
    }

    pub fn available_memory_bytes(&self) -> u64 {
        self.total_memory_bytes.saturating_sub(self.used_memory_bytes)
    }

    /// Fraction of CPU in use, in `[0, 1]`; `0.0` when the pool reports no
    /// CPU capacity at all.
    pub fn cpu_utilization(&self) -> f64 {
        if self.total_cpu <= 0.0 {
            0.0
        } else {
            (self.used_cpu / self.total_cpu).clamp(0.0, 1.0)
        }
    }

    /// Fraction of memory in use, in `[0, 1]`; `0.0` when the pool reports
    /// no memory capacity at all.
    pub fn memory_utilization(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            0.0
        } else {
            (self.used_memory_bytes as f64 / self.total_memory_bytes as f64).clamp(0.0, 1.0)
        }
    }
}

/// Transient pairing of a pool with its current utilization, plus an
/// optional strategy-assigned score. Exists for the lifetime of one
/// scheduling decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolCandidate {
    pub pool: ResourcePool,
    pub utilization: ResourceUtilization,
    pub score: Option<f64>,
}

impl PoolCandidate {
    pub fn new(pool: ResourcePool, utilization: ResourceUtilization) -> Self {
        Self {
            pool,
            utilization,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}
