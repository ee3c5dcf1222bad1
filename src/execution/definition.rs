//! Execution definition construction (spec.md §4.6, last paragraph):
//! placeholder substitution and timeout parsing for the payload sent to a
//! worker.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Job, TaskSpec};

/// The task half of an [`ExecutionDefinition`], after placeholder
/// substitution, ready to cross the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolvedTask {
    Shell { commands: Vec<String> },
    Script { script_content: String },
}

/// The payload sent to a worker as part of `execution_assignment`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDefinition {
    pub env_vars: HashMap<String, String>,
    pub task: ResolvedTask,
    pub timeout_secs: u64,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*\.([A-Za-z0-9_.]+)\s*\}\}").unwrap())
}

/// Substitutes `{{.params.KEY}}`, `{{.job.name}}`, and `{{.job.id}}`
/// placeholders in `raw` using `job`'s parameters.
pub fn substitute_placeholders(raw: &str, job: &Job) -> String {
    placeholder_pattern()
        .replace_all(raw, |caps: &regex::Captures| {
            let path = &caps[1];
            if let Some(key) = path.strip_prefix("params.") {
                job.parameters.get(key).cloned().unwrap_or_default()
            } else if path == "job.name" {
                job.name.clone()
            } else if path == "job.id" {
                job.id.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Parses a timeout string (`"30s"`, `"5m"`, `"2h"`, a bare integer of
/// seconds) into seconds. Any parse failure defaults to 300 (spec.md P8).
pub fn parse_timeout(raw: &str) -> u64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 300;
    }

    let (number, multiplier) = if let Some(n) = raw.strip_suffix('s') {
        (n, 1)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 60)
    } else if let Some(n) = raw.strip_suffix('h') {
        (n, 3600)
    } else {
        (raw, 1)
    };

    match number.parse::<u64>() {
        Ok(value) => value * multiplier,
        Err(_) => 300,
    }
}

/// Builds the substituted [`ExecutionDefinition`] sent to the worker.
pub fn build_execution_definition(job: &Job) -> ExecutionDefinition {
    let env_vars = job.parameters.clone();

    let task = match &job.task {
        TaskSpec::Shell { commands } => ResolvedTask::Shell {
            commands: commands.iter().map(|c| substitute_placeholders(c, job)).collect(),
        },
        TaskSpec::Script { script_content } => ResolvedTask::Script {
            script_content: substitute_placeholders(script_content, job),
        },
    };

    let timeout_secs = job.timeout.as_deref().map(parse_timeout).unwrap_or(300);

    ExecutionDefinition { env_vars, task, timeout_secs }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_params(pairs: &[(&str, &str)]) -> Job {
        let mut job = Job::new("my-job", "alice");
        job.parameters = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        job
    }

    #[test]
    fn substitutes_param_placeholder() {
        let job = job_with_params(&[("greeting", "hello")]);
        let result = substitute_placeholders("echo {{.params.greeting}}", &job);
        assert_eq!(result, "echo hello");
    }

    #[test]
    fn substitutes_job_name_and_id() {
        let job = job_with_params(&[]);
        let result = substitute_placeholders("echo {{.job.name}} {{.job.id}}", &job);
        assert_eq!(result, format!("echo my-job {}", job.id));
    }

    #[test]
    fn missing_param_substitutes_empty_string() {
        let job = job_with_params(&[]);
        let result = substitute_placeholders("echo [{{.params.missing}}]", &job);
        assert_eq!(result, "echo []");
    }

    #[test]
    fn unknown_placeholder_is_left_untouched() {
        let job = job_with_params(&[]);
        let result = substitute_placeholders("{{.unknown.thing}}", &job);
        assert_eq!(result, "{{.unknown.thing}}");
    }

    #[test]
    fn timeout_parsing_suffixes() {
        assert_eq!(parse_timeout("30s"), 30);
        assert_eq!(parse_timeout("5m"), 300);
        assert_eq!(parse_timeout("2h"), 7200);
        assert_eq!(parse_timeout("42"), 42);
        assert_eq!(parse_timeout("bad"), 300);
    }

    #[test]
    fn builds_shell_definition_with_substitution() {
        let mut job = job_with_params(&[("name", "world")]);
        job.task = TaskSpec::Shell { commands: vec!["echo hello {{.params.name}}".to_string()] };
        job.timeout = Some("10s".to_string());

        let def = build_execution_definition(&job);
        assert_eq!(def.timeout_secs, 10);
        match def.task {
            ResolvedTask::Shell { commands } => assert_eq!(commands, vec!["echo hello world".to_string()]),
            _ => panic!("expected shell task"),
        }
    }

    #[test]
    fn builds_script_definition_with_substitution() {
        let mut job = job_with_params(&[]);
        job.task = TaskSpec::Script { script_content: "print('{{.job.name}}')".to_string() };

        let def = build_execution_definition(&job);
        match def.task {
            ResolvedTask::Script { script_content } => assert_eq!(script_content, "print('my-job')"),
            _ => panic!("expected script task"),
        }
    }
}
