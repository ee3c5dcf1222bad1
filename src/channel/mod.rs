//! Worker Channel (C4): bidirectional streaming hub multiplexing many
//! concurrent workers with per-worker ordered delivery, retry of critical
//! inbound frames, and graceful teardown.

pub mod codec;
pub mod connection;
pub mod proto;
pub mod server;
pub mod service;

pub use connection::{ConnectionTable, WorkerConnection};
pub use server::WorkerChannelHub;
pub use service::{ArtifactRef, InboundHandler, LogChunkFrame, StatusUpdateFrame, WorkerCommunicationService};
