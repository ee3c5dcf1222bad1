//! Worker Runtime (C8): dials the Worker Channel, registers, and drives
//! assigned executions to completion (spec.md §4.8).

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::transport::Channel;
use tonic::Request;

use crate::channel::codec::{decode_outbound, encode_register_request, DecodedOutbound};
use crate::channel::proto::worker_channel_client::WorkerChannelClient;
use crate::channel::proto::WorkerMessage;

use super::executor::{execute_assignment, result_frame};

/// How long to wait for a graceful `connect()` handshake before giving up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration for a single worker process.
#[derive(Clone, Debug)]
pub struct WorkerRuntimeConfig {
    pub worker_id: String,
    pub orchestrator_endpoint: String,
}

/// Connects to the orchestrator, registers, and loops on assignments
/// until the connection drops or the process is asked to stop.
///
/// On connection loss this returns rather than retrying: spec.md §4.8
/// point 5 specifies that a fresh worker is provisioned by the
/// orchestrator for any retry, not that this process should reconnect.
pub async fn run(config: WorkerRuntimeConfig) -> Result<(), tonic::transport::Error> {
    let channel = Channel::from_shared(config.orchestrator_endpoint.clone())?
        .connect_timeout(CONNECT_TIMEOUT)
        .connect()
        .await?;

    let mut client = WorkerChannelClient::new(channel);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WorkerMessage>();
    let _ = outbound_tx.send(encode_register_request(&config.worker_id));

    let outbound_stream = UnboundedReceiverStream::new(outbound_rx);
    let response = client.connect(Request::new(outbound_stream)).await?;
    let mut inbound = response.into_inner();

    let mut active_cancel_tx: Option<watch::Sender<bool>> = None;

    loop {
        match inbound.message().await {
            Ok(Some(message)) => match decode_outbound(message) {
                DecodedOutbound::Assignment(assignment) => {
                    tracing::info!(execution_id = %assignment.execution_id, "execution assignment received");
                    let (tx, rx) = watch::channel(false);
                    active_cancel_tx = Some(tx);
                    let outcome = execute_assignment(assignment, outbound_tx.clone(), rx).await;
                    let _ = outbound_tx.send(result_frame(&outcome));
                }
                DecodedOutbound::CancelSignal { reason } => {
                    tracing::info!(reason, "cancel signal received");
                    if let Some(tx) = active_cancel_tx.as_ref() {
                        let _ = tx.send(true);
                    }
                }
                DecodedOutbound::Artifact { artifact_id, content } => {
                    tracing::info!(artifact_id, bytes = content.len(), "artifact received");
                }
                DecodedOutbound::Unknown => {
                    tracing::warn!("unrecognized OrchestratorMessage payload, ignoring");
                }
            },
            Ok(None) => {
                tracing::warn!("orchestrator closed the connection, shutting down");
                break;
            }
            Err(status) => {
                tracing::warn!(error = %status, "inbound stream error, shutting down");
                break;
            }
        }
    }

    Ok(())
}
