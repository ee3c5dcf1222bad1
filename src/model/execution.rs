//! Execution: one job's run on one assigned worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Observable execution status. Distinct from
/// [`crate::execution::state_machine::ExecutionState`], which tracks the
/// internal FSM including acknowledgement bookkeeping; this is the
/// externally-visible projection stored on the [`Execution`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// A single execution: a job bound to a worker, with a snapshot of the
/// task definition that was sent over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub worker_id: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub failure_details: Option<String>,
}

impl Execution {
    pub fn new(job_id: Uuid, worker_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            worker_id: worker_id.into(),
            status: ExecutionStatus::Pending,
            created_at: now,
            updated_at: now,
            exit_code: None,
            failure_details: None,
        }
    }

    pub fn mark_success(&mut self, exit_code: i32) {
        self.status = ExecutionStatus::Success;
        self.exit_code = Some(exit_code);
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, exit_code: Option<i32>, details: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.exit_code = exit_code;
        self.failure_details = Some(details.into());
        self.updated_at = Utc::now();
    }
}
