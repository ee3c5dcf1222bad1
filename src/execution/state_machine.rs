//! Execution State Machine (C5): per-execution finite-state machine with
//! acknowledgement tracking and a reactive state stream.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::watch;

use crate::model::JobStatus;

/// States of one execution (spec.md §3, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Created,
    Assigned,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Failed | ExecutionState::Cancelled
        )
    }

    /// Maps the current state to the Job status it should be mirrored to.
    pub fn job_status(self) -> JobStatus {
        match self {
            ExecutionState::Assigned | ExecutionState::Started => JobStatus::Running,
            ExecutionState::Completed => JobStatus::Completed,
            ExecutionState::Failed => JobStatus::Failed,
            ExecutionState::Cancelled => JobStatus::Cancelled,
            ExecutionState::Created => JobStatus::Queued,
        }
    }

    fn is_legal_transition(self, to: ExecutionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == ExecutionState::Cancelled {
            return true;
        }
        matches!(
            (self, to),
            (ExecutionState::Created, ExecutionState::Assigned)
                | (ExecutionState::Assigned, ExecutionState::Started)
                | (ExecutionState::Started, ExecutionState::Completed)
                | (ExecutionState::Started, ExecutionState::Failed)
                // the worker may fail fast without ever reporting STARTED
                | (ExecutionState::Assigned, ExecutionState::Completed)
                | (ExecutionState::Assigned, ExecutionState::Failed)
        )
    }
}

/// Metadata recorded alongside a pending, ack-requiring transition.
#[derive(Debug, Clone)]
pub struct PendingAck {
    pub message_id: String,
    pub metadata: HashMap<String, Value>,
}

/// Owns one execution's FSM: current state, pending acks, and a `watch`
/// channel subscribers can observe reactively (spec.md §4.5, §9).
pub struct ExecutionStateMachine {
    sender: watch::Sender<ExecutionState>,
    pending_acks: Mutex<HashMap<String, PendingAck>>,
}

impl ExecutionStateMachine {
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(ExecutionState::Created);
        Self {
            sender,
            pending_acks: Mutex::new(HashMap::new()),
        }
    }

    pub fn current(&self) -> ExecutionState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExecutionState> {
        self.sender.subscribe()
    }

    /// Attempts a transition. Returns `false` without side effects if the
    /// transition is illegal (I3).
    pub fn transition_to(
        &self,
        to: ExecutionState,
        message_id: Option<String>,
        requires_ack: bool,
        metadata: HashMap<String, Value>,
    ) -> bool {
        let current = self.current();
        if !current.is_legal_transition(to) {
            return false;
        }

        // `send` only errors if every receiver was dropped; the execution
        // context itself always holds one, so this is infallible in
        // practice. Treat failure as "no observers", not a transition error.
        let _ = self.sender.send(to);

        if requires_ack {
            if let Some(id) = message_id {
                self.pending_acks.lock().unwrap().insert(id.clone(), PendingAck { message_id: id, metadata });
            }
        }

        true
    }

    /// Clears a pending ack by message id. Returns `true` if one was
    /// present.
    pub fn clear_ack(&self, message_id: &str) -> bool {
        self.pending_acks.lock().unwrap().remove(message_id).is_some()
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.lock().unwrap().len()
    }
}

impl Default for ExecutionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
