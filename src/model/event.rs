//! Execution events and logs, the two things the event bus fans out.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Lifecycle event type. Maps from the wire's gRPC-style `EventType`;
/// anything unrecognized collapses to `StatusUpdate` (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    StageStarted,
    StageCompleted,
    StepStarted,
    StepCompleted,
    StatusUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub stage: Option<String>,
    pub step: Option<String>,
    pub message: String,
    pub metadata: HashMap<String, Value>,
}

impl ExecutionEvent {
    pub fn new(execution_id: Uuid, event_type: EventType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            timestamp: Utc::now(),
            event_type,
            stage: None,
            step: None,
            message: message.into(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub stream: LogStream,
    pub stage: Option<String>,
    pub step: Option<String>,
    pub message: Vec<u8>,
}

impl ExecutionLog {
    pub fn new(execution_id: Uuid, stream: LogStream, message: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            timestamp: Utc::now(),
            level: LogLevel::Info,
            stream,
            stage: None,
            step: None,
            message,
        }
    }
}
