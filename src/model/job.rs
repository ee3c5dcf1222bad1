//! Job: the unit of work a client submits to the orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskSpec;

/// Status of a job as observed by clients.
///
/// COMPLETED, FAILED, and CANCELLED are terminal: once reached, no further
/// transition is permitted (invariant I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are sinks; no transition leaves them (I2).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

/// A job submitted by a client for scheduling and execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub status: JobStatus,
    /// Optional template this job was instantiated from.
    pub template_id: Option<String>,
    pub template_version: Option<String>,
    /// Arbitrary string parameters, substituted into command/script
    /// placeholders by [`crate::execution::definition`].
    pub parameters: HashMap<String, String>,
    /// Free-form resource requirements, e.g. `cpu="1"`, `memory="2Gi"`.
    pub resource_requirements: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub creator: String,
    /// Set once the job reaches a terminal failure state.
    pub failure_details: Option<String>,
    /// Raw, unsubstituted task this job will run once assigned.
    pub task: TaskSpec,
    /// Timeout string (`"30s"`, `"5m"`, `"2h"`, a bare integer of seconds,
    /// or absent) parsed by [`crate::execution::definition`].
    pub timeout: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, creator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: JobStatus::Queued,
            template_id: None,
            template_version: None,
            parameters: HashMap::new(),
            resource_requirements: HashMap::new(),
            created_at: now,
            updated_at: now,
            creator: creator.into(),
            failure_details: None,
            task: TaskSpec::default(),
            timeout: None,
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.task = task;
        self
    }

    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    pub fn with_template(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.template_id = Some(id.into());
        self.template_version = Some(version.into());
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_resource_requirements(mut self, requirements: HashMap<String, String>) -> Self {
        self.resource_requirements = requirements;
        self
    }

    /// Idempotent status transition: setting the same status twice is a
    /// no-op, and nothing leaves a terminal status (I2).
    ///
    /// Returns `true` if the status actually changed.
    fn set_status(&mut self, status: JobStatus) -> bool {
        if self.status == status {
            return false;
        }
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    /// Mirrors a non-terminal status transition from the execution state
    /// machine. Idempotent (spec.md §4.6 step 4).
    pub fn mirror_status(&mut self, status: JobStatus) -> bool {
        self.set_status(status)
    }

    /// Direct terminal write used by `handleExecutionResult`; authoritative
    /// regardless of what the reactive mirror already wrote.
    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Direct terminal write for a failed execution.
    pub fn fail(&mut self, details: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.failure_details = Some(details.into());
        self.updated_at = Utc::now();
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_status_is_idempotent() {
        let mut job = Job::new("demo", "alice");
        assert!(job.mirror_status(JobStatus::Running));
        assert!(!job.mirror_status(JobStatus::Running));
        assert_eq!(job.status, JobStatus::Running);
    }

    #[test]
    fn terminal_status_is_a_sink() {
        let mut job = Job::new("demo", "alice");
        job.complete();
        assert!(!job.mirror_status(JobStatus::Running));
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn fail_records_details() {
        let mut job = Job::new("demo", "alice");
        job.fail("boom");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_details.as_deref(), Some("boom"));
    }
}
