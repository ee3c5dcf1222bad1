//! Worker-side task execution (C8, §4.8 steps 2-4): runs the assigned
//! shell or script task, streaming stdout/stderr and lifecycle events back
//! to the orchestrator as they happen.

use std::collections::HashMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::channel::codec::{encode_execution_result, encode_log_chunk, encode_status_update, WorkerEventType};
use crate::channel::codec::DecodedAssignment;
use crate::channel::proto::WorkerMessage;
use crate::execution::definition::ResolvedTask;

/// Grace period between SIGTERM-equivalent and a hard kill on cancellation.
const CANCEL_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Outcome of one assignment's execution.
pub struct ExecutionOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub details: String,
}

/// Runs `assignment` to completion or cancellation, emitting status and
/// log frames on `outbound` as it goes.
pub async fn execute_assignment(
    assignment: DecodedAssignment,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
    mut cancelled: watch::Receiver<bool>,
) -> ExecutionOutcome {
    match assignment.task {
        ResolvedTask::Shell { commands } => run_shell(commands, assignment.env_vars, outbound, &mut cancelled).await,
        ResolvedTask::Script { script_content } => run_script(script_content, assignment.env_vars, outbound, &mut cancelled).await,
    }
}

async fn run_shell(
    commands: Vec<String>,
    env_vars: HashMap<String, String>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
    cancelled: &mut watch::Receiver<bool>,
) -> ExecutionOutcome {
    if commands.is_empty() {
        return ExecutionOutcome { success: true, exit_code: 0, details: String::new() };
    }

    let _ = outbound.send(encode_status_update(WorkerEventType::StageStarted, "shell task started", "shell", ""));

    let total = commands.len();
    for (index, command) in commands.iter().enumerate() {
        let step = format!("step-{index}");
        let _ = outbound.send(encode_status_update(WorkerEventType::StepStarted, command, "shell", &step));

        let outcome = run_one_command(command, &env_vars, &outbound, &step, cancelled).await;

        let _ = outbound.send(encode_status_update(WorkerEventType::StepCompleted, command, "shell", &step));

        if outcome.cancelled {
            return ExecutionOutcome { success: false, exit_code: -1, details: "cancelled".to_string() };
        }

        if outcome.exit_code != 0 {
            return ExecutionOutcome {
                success: false,
                exit_code: outcome.exit_code,
                details: format!("command '{command}' exited with {}", outcome.exit_code),
            };
        }

        if index == total - 1 {
            let _ = outbound.send(encode_status_update(WorkerEventType::StageCompleted, "shell task completed", "shell", ""));
        }
    }

    ExecutionOutcome { success: true, exit_code: 0, details: String::new() }
}

async fn run_script(
    script_content: String,
    env_vars: HashMap<String, String>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
    cancelled: &mut watch::Receiver<bool>,
) -> ExecutionOutcome {
    let interpreter = env_vars.get("HODEI_SCRIPT_INTERPRETER").cloned().unwrap_or_else(|| "python3".to_string());

    let file = match tempfile::NamedTempFile::new() {
        Ok(f) => f,
        Err(e) => return ExecutionOutcome { success: false, exit_code: -1, details: format!("failed to materialize script: {e}") },
    };
    if let Err(e) = std::fs::write(file.path(), &script_content) {
        return ExecutionOutcome { success: false, exit_code: -1, details: format!("failed to write script: {e}") };
    }

    let _ = outbound.send(encode_status_update(WorkerEventType::StageStarted, "script task started", "script", ""));

    let command_line = format!("{interpreter} {}", file.path().display());
    let outcome = run_one_command(&command_line, &env_vars, &outbound, "script", cancelled).await;

    let _ = outbound.send(encode_status_update(WorkerEventType::StageCompleted, "script task completed", "script", ""));

    if outcome.cancelled {
        ExecutionOutcome { success: false, exit_code: -1, details: "cancelled".to_string() }
    } else if outcome.exit_code != 0 {
        ExecutionOutcome { success: false, exit_code: outcome.exit_code, details: format!("script exited with {}", outcome.exit_code) }
    } else {
        ExecutionOutcome { success: true, exit_code: 0, details: String::new() }
    }
}

struct CommandOutcome {
    exit_code: i32,
    cancelled: bool,
}

async fn run_one_command(
    command_line: &str,
    env_vars: &HashMap<String, String>,
    outbound: &mpsc::UnboundedSender<WorkerMessage>,
    step: &str,
    cancelled: &mut watch::Receiver<bool>,
) -> CommandOutcome {
    let mut command = Command::new("sh");
    command.arg("-c").arg(command_line).envs(env_vars).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            let _ = outbound.send(encode_log_chunk(true, format!("failed to spawn command: {e}").into_bytes(), "shell", step));
            return CommandOutcome { exit_code: -1, cancelled: false };
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    if let Some(stdout) = stdout {
        spawn_log_pump(stdout, false, outbound.clone(), step.to_string());
    }
    if let Some(stderr) = stderr {
        spawn_log_pump(stderr, true, outbound.clone(), step.to_string());
    }

    loop {
        tokio::select! {
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                return CommandOutcome { exit_code: code, cancelled: false };
            }
            changed = cancelled.changed() => {
                if changed.is_ok() && *cancelled.borrow() {
                    let _ = child.start_kill();
                    let _ = tokio::time::timeout(CANCEL_GRACE, child.wait()).await;
                    let _ = child.start_kill();
                    return CommandOutcome { exit_code: -1, cancelled: true };
                }
            }
        }
    }
}

fn spawn_log_pump<R>(reader: R, is_stderr: bool, outbound: mpsc::UnboundedSender<WorkerMessage>, step: String)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let mut content = line.into_bytes();
            content.push(b'\n');
            let _ = outbound.send(encode_log_chunk(is_stderr, content, "shell", &step));
        }
    });
}

/// Builds the terminal `execution_result` frame once the assignment has
/// run to completion.
pub fn result_frame(outcome: &ExecutionOutcome) -> WorkerMessage {
    encode_execution_result(outcome.success, outcome.exit_code, &outcome.details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ArtifactRef;

    fn assignment(commands: Vec<&str>) -> DecodedAssignment {
        DecodedAssignment {
            execution_id: "exec-1".to_string(),
            env_vars: HashMap::new(),
            task: ResolvedTask::Shell { commands: commands.into_iter().map(String::from).collect() },
            required_artifacts: Vec::<ArtifactRef>::new(),
        }
    }

    #[tokio::test]
    async fn successful_shell_commands_report_success() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = execute_assignment(assignment(vec!["true"]), tx, cancel_rx).await;
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn failing_command_reports_failure_with_its_exit_code() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = execute_assignment(assignment(vec!["exit 7"]), tx, cancel_rx).await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 7);
    }

    #[tokio::test]
    async fn stdout_is_streamed_as_log_chunks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = execute_assignment(assignment(vec!["echo hi"]), tx, cancel_rx).await;
        assert!(outcome.success);

        // give the spawned log pump a moment to flush before draining.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let mut saw_log = false;
        while let Ok(_msg) = rx.try_recv() {
            saw_log = true;
        }
        assert!(saw_log);
    }
}
