//! Per-worker connection state: an outbound queue, a liveness flag, and a
//! completion signal used during drain (spec.md §3, §4.4).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify, RwLock};

use super::proto::OrchestratorMessage;

/// One worker's half of the bidirectional stream. A worker id maps to at
/// most one live connection at a time (I1/P2); a second `register_request`
/// for the same id supersedes the first.
pub struct WorkerConnection {
    pub worker_id: String,
    outbound: mpsc::UnboundedSender<OrchestratorMessage>,
    alive: AtomicBool,
    /// Signaled once by the Engine to unblock the 5 s drain wait on
    /// teardown (spec.md §4.4, "Teardown").
    pub completion_signal: Notify,
}

impl WorkerConnection {
    pub fn new(worker_id: impl Into<String>, outbound: mpsc::UnboundedSender<OrchestratorMessage>) -> Self {
        Self {
            worker_id: worker_id.into(),
            outbound,
            alive: AtomicBool::new(true),
            completion_signal: Notify::new(),
        }
    }

    /// Enqueues a message for FIFO delivery to this worker (P4). Returns
    /// `false` if the connection's writer task has already exited.
    pub fn enqueue(&self, message: OrchestratorMessage) -> bool {
        self.alive.load(Ordering::SeqCst) && self.outbound.send(message).is_ok()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Maps worker id to its current connection. Mutated only by the Worker
/// Channel (spec.md §5, "Shared resources").
#[derive(Default)]
pub struct ConnectionTable {
    connections: RwLock<HashMap<String, Arc<WorkerConnection>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection, superseding and marking dead whatever
    /// connection previously held this worker id.
    pub async fn register(&self, connection: Arc<WorkerConnection>) -> Option<Arc<WorkerConnection>> {
        let mut connections = self.connections.write().await;
        let previous = connections.insert(connection.worker_id.clone(), connection);
        if let Some(old) = &previous {
            old.mark_dead();
        } else if let Some(gauge) = crate::metrics::CONNECTED_WORKERS.get() {
            gauge.inc();
        }
        previous
    }

    pub async fn remove(&self, worker_id: &str) -> Option<Arc<WorkerConnection>> {
        let removed = self.connections.write().await.remove(worker_id);
        if removed.is_some() {
            if let Some(gauge) = crate::metrics::CONNECTED_WORKERS.get() {
                gauge.dec();
            }
        }
        removed
    }

    pub async fn get(&self, worker_id: &str) -> Option<Arc<WorkerConnection>> {
        self.connections.read().await.get(worker_id).cloned()
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.connections.read().await.keys().cloned().collect()
    }

    pub async fn is_connected(&self, worker_id: &str) -> bool {
        self.connections
            .read()
            .await
            .get(worker_id)
            .map(|c| c.is_alive())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(id: &str) -> Arc<WorkerConnection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(WorkerConnection::new(id, tx))
    }

    #[tokio::test]
    async fn second_registration_supersedes_first() {
        let table = ConnectionTable::new();
        let first = connection("w1");
        let second = connection("w1");

        table.register(first.clone()).await;
        table.register(second.clone()).await;

        assert!(!first.is_alive());
        assert!(second.is_alive());
        assert!(table.is_connected("w1").await);
    }

    #[tokio::test]
    async fn removed_connection_is_not_connected() {
        let table = ConnectionTable::new();
        table.register(connection("w1")).await;
        table.remove("w1").await;
        assert!(!table.is_connected("w1").await);
    }
}
