//! WorkerInstance: an ephemeral worker provisioned by the Worker Factory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a provisioned worker (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerPhase {
    /// Created by the factory, not yet connected.
    Created,
    /// Connected via the Worker Channel.
    Registered,
    /// Bound to exactly one execution.
    Assigned,
    /// Unbound from its execution; still alive and eligible for reuse.
    Released,
    /// Destruction requested or completed.
    Destroyed,
}

/// A worker instance as tracked by the Worker Factory & Registry (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstance {
    pub id: String,
    pub pool_id: String,
    pub pool_type: String,
    pub phase: WorkerPhase,
    pub assigned_execution_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Backend-specific handle (container id, pod name, ...), opaque to
    /// everything outside the factory implementation that created it.
    pub backend_handle: Option<String>,
}

impl WorkerInstance {
    pub fn new(id: impl Into<String>, pool_id: impl Into<String>, pool_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pool_id: pool_id.into(),
            pool_type: pool_type.into(),
            phase: WorkerPhase::Created,
            assigned_execution_id: None,
            created_at: Utc::now(),
            backend_handle: None,
        }
    }

    pub fn with_backend_handle(mut self, handle: impl Into<String>) -> Self {
        self.backend_handle = Some(handle.into());
        self
    }
}
