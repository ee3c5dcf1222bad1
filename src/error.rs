//! Error types for the orchestrator's subsystems.
//!
//! One `thiserror` enum per subsystem, matching the boundary each
//! component owns: scheduling, worker provisioning, transport, and the
//! execution engine. Illegal state-machine transitions are not modeled as
//! errors — they return `bool` per spec (no side effect on rejection).

use thiserror::Error;

/// Errors from the Pool Candidate Evaluator and Scheduling Strategies
/// (C1 + C2).
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("No candidate pools available")]
    NoCandidates,

    #[error("Failed to select pool: {0}")]
    SelectionFailed(String),
}

/// Errors from the Worker Factory & Registry (C3).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker creation failed: {0}")]
    CreationFailed(String),

    #[error("Worker deletion failed: {0}")]
    DeletionFailed(String),

    #[error("Pool type '{0}' is not supported by this factory")]
    UnsupportedPoolType(String),

    #[error("Worker failed to register within timeout")]
    RegistrationTimeout,

    #[error("Failed to assign worker '{0}' to an execution")]
    AssignmentFailed(String),
}

/// Errors from the Worker Channel (C4).
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("No connection registered for worker '{0}'")]
    NotConnected(String),

    #[error("Failed to send frame to worker '{0}': {1}")]
    SendFailed(String, String),

    #[error("Stream ended unexpectedly: {0}")]
    StreamClosed(String),
}

/// Errors surfaced by the Execution Engine (C6).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Template validation failed: {0}")]
    TemplateInvalid(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Unknown execution id: {0}")]
    UnknownExecution(String),

    #[error("Repository write failed: {0}")]
    RepositoryFailed(String),
}
