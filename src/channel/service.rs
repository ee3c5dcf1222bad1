//! The two narrow capability interfaces that keep the Engine and the
//! transport from depending on each other's concrete types (spec.md §9,
//! "Cyclic dependency Engine↔Transport").
//!
//! [`WorkerCommunicationService`] is consumed by the Engine and implemented
//! by the transport. [`InboundHandler`] is consumed by the transport and
//! implemented by the Engine. Neither module imports the other's types —
//! only `uuid::Uuid` and the plain data in [`crate::model`] and
//! [`crate::execution::definition`] cross the boundary.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ChannelError, EngineError};
use crate::execution::definition::ExecutionDefinition;

/// An artifact reference accompanying an assignment.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub artifact_id: String,
    pub uri: String,
}

/// Outbound capability the Engine needs from the transport.
#[async_trait]
pub trait WorkerCommunicationService: Send + Sync {
    async fn send_execution_assignment(
        &self,
        worker_id: &str,
        execution_id: Uuid,
        definition: ExecutionDefinition,
        required_artifacts: Vec<ArtifactRef>,
    ) -> Result<(), ChannelError>;

    async fn send_cancel_signal(&self, worker_id: &str, reason: &str) -> Result<(), ChannelError>;

    async fn send_artifact(&self, worker_id: &str, artifact_id: &str, content: Vec<u8>) -> Result<(), ChannelError>;

    async fn is_worker_connected(&self, worker_id: &str) -> bool;

    async fn connected_workers(&self) -> Vec<String>;
}

/// Decoded status-update payload, stripped of wire types.
#[derive(Debug, Clone)]
pub struct StatusUpdateFrame {
    pub event_type_tag: i32,
    pub message: String,
    pub stage: Option<String>,
    pub step: Option<String>,
}

/// Decoded log-chunk payload.
#[derive(Debug, Clone)]
pub struct LogChunkFrame {
    pub is_stderr: bool,
    pub content: Vec<u8>,
    pub stage: Option<String>,
    pub step: Option<String>,
}

/// Inbound capability the transport needs from the Engine.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Resolves the active execution currently bound to `worker_id`, per
    /// the "active execution for worker" routing rule (spec.md §4.4).
    async fn active_execution_for_worker(&self, worker_id: &str) -> Option<Uuid>;

    async fn handle_status_update(&self, execution_id: Uuid, frame: StatusUpdateFrame);

    async fn handle_log_chunk(&self, execution_id: Uuid, frame: LogChunkFrame);

    /// Critical frame; the transport retries this call up to 3 times with
    /// exponential backoff before giving up on it (spec.md §4.4).
    async fn handle_execution_result(
        &self,
        execution_id: Uuid,
        success: bool,
        exit_code: i32,
        details: String,
    ) -> Result<(), EngineError>;
}
