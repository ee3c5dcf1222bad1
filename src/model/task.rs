//! Task specification a job carries before substitution: either an ordered
//! list of shell commands or a script body, both possibly containing
//! `{{.params.KEY}}`-style placeholders.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskSpec {
    Shell { commands: Vec<String> },
    Script { script_content: String },
}

impl Default for TaskSpec {
    fn default() -> Self {
        TaskSpec::Shell { commands: Vec::new() }
    }
}
