//! Worker Channel (C4): the bidirectional streaming RPC endpoint.
//!
//! One task pair per connected worker — a reader draining the inbound
//! stream and routing frames, and a writer draining the outbound queue
//! onto the wire in FIFO order (spec.md §4.4).

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::execution::definition::ExecutionDefinition;
use crate::worker::WorkerRegistry;

use super::codec::{decode_inbound, encode_artifact, encode_assignment, encode_cancel_signal, DecodedInbound};
use super::connection::{ConnectionTable, WorkerConnection};
use super::proto::worker_channel_server::WorkerChannel;
use super::proto::{OrchestratorMessage, WorkerMessage};
use super::service::{ArtifactRef, InboundHandler, LogChunkFrame, StatusUpdateFrame, WorkerCommunicationService};

const RESULT_MAX_ATTEMPTS: u32 = 3;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the connection table and bridges it to a [`WorkerRegistry`] for
/// teardown bookkeeping. Implements both transport-facing traits: the
/// tonic service (inbound) and [`WorkerCommunicationService`] (outbound,
/// consumed by the Engine).
pub struct WorkerChannelHub<H: InboundHandler + 'static> {
    connections: Arc<ConnectionTable>,
    inbound: Arc<H>,
    registry: Arc<WorkerRegistry>,
}

impl<H: InboundHandler + 'static> WorkerChannelHub<H> {
    pub fn new(inbound: Arc<H>, registry: Arc<WorkerRegistry>) -> Self {
        Self { connections: Arc::new(ConnectionTable::new()), inbound, registry }
    }
}

// All fields are `Arc`s, so cloning is cheap: a clone shares the same
// connection table, inbound handler, and registry as the original. This
// lets the same hub serve as both the tonic service (which takes its
// inner type by value) and the `WorkerCommunicationService` trait object
// held by the Engine.
impl<H: InboundHandler + 'static> Clone for WorkerChannelHub<H> {
    fn clone(&self) -> Self {
        Self {
            connections: self.connections.clone(),
            inbound: self.inbound.clone(),
            registry: self.registry.clone(),
        }
    }
}

type ConnectStream = Pin<Box<dyn Stream<Item = Result<OrchestratorMessage, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl<H: InboundHandler + 'static> WorkerChannel for WorkerChannelHub<H> {
    type ConnectStream = ConnectStream;

    async fn connect(&self, request: Request<Streaming<WorkerMessage>>) -> Result<Response<Self::ConnectStream>, Status> {
        let mut inbound_stream = request.into_inner();

        let first = inbound_stream
            .message()
            .await
            .map_err(|e| Status::aborted(format!("stream error before registration: {e}")))?
            .ok_or_else(|| Status::invalid_argument("stream closed before registration"))?;

        let worker_id = match decode_inbound(first) {
            DecodedInbound::RegisterRequest { worker_id } => worker_id,
            _ => return Err(Status::invalid_argument("first frame must be register_request")),
        };

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let connection = Arc::new(WorkerConnection::new(worker_id.clone(), tx));
        self.connections.register(connection.clone()).await;
        self.registry.register_worker(&worker_id).await;
        tracing::info!(worker_id = %worker_id, "worker registered");

        let reader_connections = self.connections.clone();
        let reader_registry = self.registry.clone();
        let reader_inbound = self.inbound.clone();
        let reader_connection = connection.clone();
        let reader_worker_id = worker_id.clone();

        tokio::spawn(async move {
            loop {
                match inbound_stream.next().await {
                    Some(Ok(message)) => {
                        route_inbound(&reader_worker_id, message, &reader_inbound, &reader_connection).await;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(worker_id = %reader_worker_id, error = %e, "inbound stream error");
                        break;
                    }
                    None => break,
                }
            }

            // Teardown (spec.md §4.4): give the engine a window to finish
            // processing a just-arrived execution_result before we drop
            // the connection entry.
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, reader_connection.completion_signal.notified()).await;

            reader_connection.mark_dead();
            reader_connections.remove(&reader_worker_id).await;
            reader_registry.mark_destroyed(&reader_worker_id).await;
            tracing::info!(worker_id = %reader_worker_id, "worker connection torn down");
        });

        let outbound = UnboundedReceiverStream::new(rx).map(Ok);
        Ok(Response::new(Box::pin(outbound)))
    }
}

async fn route_inbound<H: InboundHandler>(
    worker_id: &str,
    message: WorkerMessage,
    inbound: &Arc<H>,
    connection: &Arc<WorkerConnection>,
) {
    let decoded = decode_inbound(message);

    let execution_id = match &decoded {
        DecodedInbound::RegisterRequest { .. } | DecodedInbound::Unknown => None,
        _ => inbound.active_execution_for_worker(worker_id).await,
    };

    let Some(execution_id) = execution_id else {
        match decoded {
            DecodedInbound::RegisterRequest { .. } => {
                tracing::warn!(worker_id, "duplicate register_request on an established stream, ignoring");
            }
            DecodedInbound::Unknown => {
                tracing::warn!(worker_id, "unrecognized WorkerMessage payload, ignoring");
            }
            _ => {
                tracing::warn!(worker_id, "no active execution for worker, dropping frame");
            }
        }
        return;
    };

    match decoded {
        DecodedInbound::StatusUpdate(frame) => {
            inbound.handle_status_update(execution_id, frame).await;
        }
        DecodedInbound::LogChunk(frame) => {
            inbound.handle_log_chunk(execution_id, frame).await;
        }
        DecodedInbound::ExecutionResult { success, exit_code, details } => {
            retry_execution_result(inbound, execution_id, success, exit_code, details).await;
            connection.completion_signal.notify_one();
        }
        DecodedInbound::RegisterRequest { .. } | DecodedInbound::Unknown => {}
    }
}

/// Bounded retry for the one critical inbound frame: up to 3 attempts,
/// backoff `100·attempt` ms (spec.md §4.4).
async fn retry_execution_result<H: InboundHandler>(
    inbound: &Arc<H>,
    execution_id: Uuid,
    success: bool,
    exit_code: i32,
    details: String,
) {
    for attempt in 1..=RESULT_MAX_ATTEMPTS {
        match inbound.handle_execution_result(execution_id, success, exit_code, details.clone()).await {
            Ok(()) => return,
            Err(e) if attempt < RESULT_MAX_ATTEMPTS => {
                tracing::warn!(%execution_id, attempt, error = %e, "execution_result delivery failed, retrying");
                tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
            }
            Err(e) => {
                tracing::error!(%execution_id, error = %e, "execution_result delivery exhausted retries, dropping frame");
            }
        }
    }
}

#[async_trait]
impl<H: InboundHandler + 'static> WorkerCommunicationService for WorkerChannelHub<H> {
    async fn send_execution_assignment(
        &self,
        worker_id: &str,
        execution_id: Uuid,
        definition: ExecutionDefinition,
        required_artifacts: Vec<ArtifactRef>,
    ) -> Result<(), ChannelError> {
        let connection = self
            .connections
            .get(worker_id)
            .await
            .ok_or_else(|| ChannelError::NotConnected(worker_id.to_string()))?;

        let message = encode_assignment(&execution_id.to_string(), &definition, &required_artifacts);
        if connection.enqueue(message) {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(worker_id.to_string(), "outbound queue closed".to_string()))
        }
    }

    async fn send_cancel_signal(&self, worker_id: &str, reason: &str) -> Result<(), ChannelError> {
        let connection = self
            .connections
            .get(worker_id)
            .await
            .ok_or_else(|| ChannelError::NotConnected(worker_id.to_string()))?;

        if connection.enqueue(encode_cancel_signal(reason)) {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(worker_id.to_string(), "outbound queue closed".to_string()))
        }
    }

    async fn send_artifact(&self, worker_id: &str, artifact_id: &str, content: Vec<u8>) -> Result<(), ChannelError> {
        let connection = self
            .connections
            .get(worker_id)
            .await
            .ok_or_else(|| ChannelError::NotConnected(worker_id.to_string()))?;

        if connection.enqueue(encode_artifact(artifact_id, content)) {
            Ok(())
        } else {
            Err(ChannelError::SendFailed(worker_id.to_string(), "outbound queue closed".to_string()))
        }
    }

    async fn is_worker_connected(&self, worker_id: &str) -> bool {
        self.connections.is_connected(worker_id).await
    }

    async fn connected_workers(&self) -> Vec<String> {
        self.connections.connected_ids().await
    }
}
