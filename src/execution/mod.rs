//! Execution State Machine (C5) and Execution Engine (C6): the per-job
//! lifecycle from scheduling decision through worker assignment to
//! terminal outcome.

pub mod definition;
pub mod engine;
pub mod state_machine;

pub use definition::{build_execution_definition, parse_timeout, substitute_placeholders, ExecutionDefinition, ResolvedTask};
pub use engine::ExecutionEngine;
pub use state_machine::{ExecutionState, ExecutionStateMachine};
