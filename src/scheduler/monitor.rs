//! `ResourceMonitor`: the collaborator the Pool Candidate Evaluator asks
//! for live utilization snapshots (spec.md §6, "Engine→collaborator
//! contracts").
//!
//! Persistent storage is a non-goal; the in-memory implementation here is
//! the one a standalone orchestrator process would actually run with.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::ResourceUtilization;

/// Produces utilization snapshots for a set of pool ids.
#[async_trait]
pub trait ResourceMonitor: Send + Sync {
    /// Returns whatever snapshots are available for the requested pool
    /// ids. Pools with no known snapshot are simply absent from the
    /// result — callers must not assume every id is represented.
    async fn utilization_for(&self, pool_ids: &[String]) -> HashMap<String, ResourceUtilization>;
}

/// In-memory `ResourceMonitor` backed by snapshots pushed in by whatever
/// collects them (a polling loop against the Docker/Kubernetes backend, a
/// test harness, ...).
#[derive(Default)]
pub struct InMemoryResourceMonitor {
    snapshots: RwLock<HashMap<String, ResourceUtilization>>,
}

impl InMemoryResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot for a single pool.
    pub async fn record(&self, utilization: ResourceUtilization) {
        self.snapshots
            .write()
            .await
            .insert(utilization.pool_id.clone(), utilization);
    }
}

#[async_trait]
impl ResourceMonitor for InMemoryResourceMonitor {
    async fn utilization_for(&self, pool_ids: &[String]) -> HashMap<String, ResourceUtilization> {
        let snapshots = self.snapshots.read().await;
        pool_ids
            .iter()
            .filter_map(|id| snapshots.get(id).map(|u| (id.clone(), u.clone())))
            .collect()
    }
}
