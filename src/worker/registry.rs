//! Worker Registry (C3, tracking half): registration, assignment, and
//! release of provisioned workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};

use crate::model::{WorkerInstance, WorkerPhase};

/// Tracks every worker the factory has created, from provisioning through
/// destruction.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerInstance>>,
    registration_signals: RwLock<HashMap<String, Arc<Notify>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins tracking a freshly created worker, before it has connected.
    pub async fn track(&self, worker: WorkerInstance) {
        self.workers.write().await.insert(worker.id.clone(), worker);
        if let Some(gauge) = crate::metrics::ACTIVE_WORKERS.get() {
            gauge.inc();
        }
    }

    /// Marks a worker as registered (it connected via the Worker Channel)
    /// and wakes any task waiting on its registration.
    pub async fn register_worker(&self, id: &str) {
        if let Some(worker) = self.workers.write().await.get_mut(id) {
            worker.phase = WorkerPhase::Registered;
        }
        if let Some(notify) = self.registration_signals.read().await.get(id) {
            notify.notify_waiters();
        }
    }

    /// Suspends until `id` registers or `timeout` elapses. Returns the
    /// worker's current state on success.
    pub async fn wait_for_worker_registration(&self, id: &str, timeout: Duration) -> Option<WorkerInstance> {
        if let Some(worker) = self.snapshot(id).await {
            if worker.phase != WorkerPhase::Created {
                return Some(worker);
            }
        } else {
            return None;
        }

        let notify = {
            let mut signals = self.registration_signals.write().await;
            signals.entry(id.to_string()).or_insert_with(|| Arc::new(Notify::new())).clone()
        };

        // Re-check after registering interest: `register_worker` may have
        // already flipped the phase and fired its notification before we
        // reached this point.
        if let Some(worker) = self.snapshot(id).await {
            if worker.phase != WorkerPhase::Created {
                self.registration_signals.write().await.remove(id);
                return Some(worker);
            }
        }

        let waited = tokio::time::timeout(timeout, notify.notified()).await;
        self.registration_signals.write().await.remove(id);

        if waited.is_err() {
            return None;
        }

        self.snapshot(id).await
    }

    /// Binds a registered (or previously released) worker to an execution.
    /// Fails if the worker is unknown, destroyed, or already assigned.
    pub async fn assign_worker_to_execution(&self, id: &str, execution_id: &str) -> bool {
        let mut workers = self.workers.write().await;
        let Some(worker) = workers.get_mut(id) else {
            return false;
        };
        match worker.phase {
            WorkerPhase::Registered | WorkerPhase::Released => {
                worker.phase = WorkerPhase::Assigned;
                worker.assigned_execution_id = Some(execution_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Unbinds a worker from its execution, making it eligible for reuse
    /// while still alive.
    pub async fn release_worker(&self, id: &str) {
        if let Some(worker) = self.workers.write().await.get_mut(id) {
            if worker.phase == WorkerPhase::Assigned {
                worker.phase = WorkerPhase::Released;
                worker.assigned_execution_id = None;
            }
        }
    }

    /// Marks a worker destroyed and stops tracking it.
    pub async fn mark_destroyed(&self, id: &str) {
        let removed = self.workers.write().await.remove(id);
        self.registration_signals.write().await.remove(id);
        if removed.is_some() {
            if let Some(gauge) = crate::metrics::ACTIVE_WORKERS.get() {
                gauge.dec();
            }
        }
    }

    /// Finds an idle worker on the given pool type, if any exist.
    pub async fn find_available_worker(&self, pool_type: &str) -> Option<WorkerInstance> {
        self.workers
            .read()
            .await
            .values()
            .find(|w| w.phase == WorkerPhase::Released && w.pool_type == pool_type)
            .cloned()
    }

    pub async fn snapshot(&self, id: &str) -> Option<WorkerInstance> {
        self.workers.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str) -> WorkerInstance {
        WorkerInstance::new(id, "p1", "docker")
    }

    #[tokio::test]
    async fn wait_for_registration_returns_immediately_if_already_registered() {
        let registry = WorkerRegistry::new();
        registry.track(worker("w1")).await;
        registry.register_worker("w1").await;

        let result = registry
            .wait_for_worker_registration("w1", Duration::from_millis(50))
            .await;

        assert!(result.is_some());
    }

    #[tokio::test]
    async fn wait_for_registration_times_out() {
        let registry = WorkerRegistry::new();
        registry.track(worker("w1")).await;

        let result = registry
            .wait_for_worker_registration("w1", Duration::from_millis(20))
            .await;

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn wait_for_registration_wakes_on_concurrent_register() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.track(worker("w1")).await;

        let waiter_registry = registry.clone();
        let waiter = tokio::spawn(async move {
            waiter_registry
                .wait_for_worker_registration("w1", Duration::from_secs(5))
                .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        registry.register_worker("w1").await;

        let result = waiter.await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn assign_then_release_allows_reassignment() {
        let registry = WorkerRegistry::new();
        registry.track(worker("w1")).await;
        registry.register_worker("w1").await;

        assert!(registry.assign_worker_to_execution("w1", "exec-1").await);
        assert!(!registry.assign_worker_to_execution("w1", "exec-2").await);

        registry.release_worker("w1").await;
        assert!(registry.assign_worker_to_execution("w1", "exec-2").await);
    }

    #[tokio::test]
    async fn find_available_worker_only_returns_released() {
        let registry = WorkerRegistry::new();
        registry.track(worker("w1")).await;
        registry.register_worker("w1").await;
        assert!(registry.find_available_worker("docker").await.is_none());

        registry.assign_worker_to_execution("w1", "exec-1").await;
        registry.release_worker("w1").await;

        let found = registry.find_available_worker("docker").await;
        assert_eq!(found.map(|w| w.id), Some("w1".to_string()));
    }
}
