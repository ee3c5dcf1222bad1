//! Conversions between the wire's generated prost types and the plain
//! domain types the rest of the crate works with.

use std::collections::HashMap;

use super::proto::{
    self, execution_definition::Task as WireTask, orchestrator_message::Payload as OutPayload,
    worker_message::Payload as InPayload, EventType as WireEventType, LogStream as WireLogStream,
    OrchestratorMessage, ScriptTask, ShellTask, WorkerMessage,
};
use super::service::{ArtifactRef, LogChunkFrame, StatusUpdateFrame};
use crate::execution::definition::{ExecutionDefinition, ResolvedTask};

/// Builds the wire `OrchestratorMessage` carrying an execution assignment.
pub fn encode_assignment(
    execution_id: &str,
    definition: &ExecutionDefinition,
    required_artifacts: &[ArtifactRef],
) -> OrchestratorMessage {
    let task = match &definition.task {
        ResolvedTask::Shell { commands } => WireTask::Shell(ShellTask { commands: commands.clone() }),
        ResolvedTask::Script { script_content } => WireTask::Script(ScriptTask {
            script_content: script_content.clone(),
            parameters: Default::default(),
        }),
    };

    let wire_definition = proto::ExecutionDefinition {
        env_vars: definition.env_vars.clone(),
        task: Some(task),
    };

    let wire_artifacts = required_artifacts
        .iter()
        .map(|a| proto::ArtifactRef { artifact_id: a.artifact_id.clone(), uri: a.uri.clone() })
        .collect();

    OrchestratorMessage {
        payload: Some(OutPayload::ExecutionAssignment(proto::ExecutionAssignment {
            execution_id: execution_id.to_string(),
            definition: Some(wire_definition),
            required_artifacts: wire_artifacts,
        })),
    }
}

pub fn encode_cancel_signal(reason: &str) -> OrchestratorMessage {
    OrchestratorMessage {
        payload: Some(OutPayload::CancelSignal(proto::CancelSignal { reason: reason.to_string() })),
    }
}

pub fn encode_artifact(artifact_id: &str, content: Vec<u8>) -> OrchestratorMessage {
    OrchestratorMessage {
        payload: Some(OutPayload::Artifact(proto::Artifact { artifact_id: artifact_id.to_string(), content })),
    }
}

/// What an inbound `WorkerMessage` decoded to, for routing purposes.
pub enum DecodedInbound {
    RegisterRequest { worker_id: String },
    StatusUpdate(StatusUpdateFrame),
    LogChunk(LogChunkFrame),
    ExecutionResult { success: bool, exit_code: i32, details: String },
    /// A payload the channel doesn't recognize; ignored with a warning
    /// (spec.md §6, "forward-compatible").
    Unknown,
}

pub fn decode_inbound(message: WorkerMessage) -> DecodedInbound {
    match message.payload {
        Some(InPayload::RegisterRequest(req)) => DecodedInbound::RegisterRequest { worker_id: req.worker_id },
        Some(InPayload::StatusUpdate(update)) => DecodedInbound::StatusUpdate(StatusUpdateFrame {
            event_type_tag: update.event_type,
            message: update.message,
            stage: non_empty(update.stage),
            step: non_empty(update.step),
        }),
        Some(InPayload::LogChunk(chunk)) => DecodedInbound::LogChunk(LogChunkFrame {
            is_stderr: chunk.stream == WireLogStream::Stderr as i32,
            content: chunk.content,
            stage: non_empty(chunk.stage),
            step: non_empty(chunk.step),
        }),
        Some(InPayload::ExecutionResult(result)) => DecodedInbound::ExecutionResult {
            success: result.success,
            exit_code: result.exit_code,
            details: result.details,
        },
        None => DecodedInbound::Unknown,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Maps the wire's gRPC-style `EventType` tag to the crate's `EventType`,
/// collapsing anything unrecognized to `StatusUpdate` (spec.md §4.6).
pub fn map_event_type(tag: i32) -> crate::model::EventType {
    match WireEventType::try_from(tag) {
        Ok(WireEventType::StageStarted) => crate::model::EventType::StageStarted,
        Ok(WireEventType::StageCompleted) => crate::model::EventType::StageCompleted,
        Ok(WireEventType::StepStarted) => crate::model::EventType::StepStarted,
        Ok(WireEventType::StepCompleted) => crate::model::EventType::StepCompleted,
        _ => crate::model::EventType::StatusUpdate,
    }
}

/// A decoded `ExecutionAssignment`, ready for the worker runtime to act
/// on.
pub struct DecodedAssignment {
    pub execution_id: String,
    pub env_vars: HashMap<String, String>,
    pub task: ResolvedTask,
    pub required_artifacts: Vec<ArtifactRef>,
}

/// What an `OrchestratorMessage` decoded to, from the worker's side.
pub enum DecodedOutbound {
    Assignment(DecodedAssignment),
    CancelSignal { reason: String },
    Artifact { artifact_id: String, content: Vec<u8> },
    /// Forward-compatible: an unrecognized payload is ignored, not fatal
    /// (spec.md §6).
    Unknown,
}

pub fn decode_outbound(message: OrchestratorMessage) -> DecodedOutbound {
    match message.payload {
        Some(OutPayload::ExecutionAssignment(assignment)) => {
            let Some(definition) = assignment.definition else {
                return DecodedOutbound::Unknown;
            };
            let task = match definition.task {
                Some(WireTask::Shell(shell)) => ResolvedTask::Shell { commands: shell.commands },
                Some(WireTask::Script(script)) => ResolvedTask::Script { script_content: script.script_content },
                None => return DecodedOutbound::Unknown,
            };
            DecodedOutbound::Assignment(DecodedAssignment {
                execution_id: assignment.execution_id,
                env_vars: definition.env_vars,
                task,
                required_artifacts: assignment
                    .required_artifacts
                    .into_iter()
                    .map(|a| ArtifactRef { artifact_id: a.artifact_id, uri: a.uri })
                    .collect(),
            })
        }
        Some(OutPayload::CancelSignal(signal)) => DecodedOutbound::CancelSignal { reason: signal.reason },
        Some(OutPayload::Artifact(artifact)) => DecodedOutbound::Artifact { artifact_id: artifact.artifact_id, content: artifact.content },
        None => DecodedOutbound::Unknown,
    }
}

pub fn encode_register_request(worker_id: &str) -> WorkerMessage {
    WorkerMessage {
        payload: Some(InPayload::RegisterRequest(proto::RegisterRequest { worker_id: worker_id.to_string() })),
    }
}

/// Wire-level event type tags the worker runtime emits (spec.md §4.8).
pub enum WorkerEventType {
    StageStarted,
    StageCompleted,
    StepStarted,
    StepCompleted,
}

pub fn encode_status_update(event_type: WorkerEventType, message: &str, stage: &str, step: &str) -> WorkerMessage {
    let wire_type = match event_type {
        WorkerEventType::StageStarted => WireEventType::StageStarted,
        WorkerEventType::StageCompleted => WireEventType::StageCompleted,
        WorkerEventType::StepStarted => WireEventType::StepStarted,
        WorkerEventType::StepCompleted => WireEventType::StepCompleted,
    };

    WorkerMessage {
        payload: Some(InPayload::StatusUpdate(proto::StatusUpdate {
            event_type: wire_type as i32,
            message: message.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            stage: stage.to_string(),
            step: step.to_string(),
        })),
    }
}

pub fn encode_log_chunk(is_stderr: bool, content: Vec<u8>, stage: &str, step: &str) -> WorkerMessage {
    let stream = if is_stderr { WireLogStream::Stderr } else { WireLogStream::Stdout };
    WorkerMessage {
        payload: Some(InPayload::LogChunk(proto::LogChunk {
            stream: stream as i32,
            content,
            stage: stage.to_string(),
            step: step.to_string(),
        })),
    }
}

pub fn encode_execution_result(success: bool, exit_code: i32, details: &str) -> WorkerMessage {
    WorkerMessage {
        payload: Some(InPayload::ExecutionResult(proto::ExecutionResult {
            success,
            exit_code,
            details: details.to_string(),
        })),
    }
}
