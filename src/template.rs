//! Minimal template type: just enough for `startExecution`'s publish
//! check (spec.md §4.6 step 1). Template CRUD itself is an external
//! collaborator, out of scope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub version: String,
    pub status: TemplateStatus,
}

impl Template {
    /// Constructs a template already in `PUBLISHED` state, the common case
    /// for tests and seed data.
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            status: TemplateStatus::Published,
        }
    }

    pub fn with_status(mut self, status: TemplateStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_published(&self) -> bool {
        self.status == TemplateStatus::Published
    }
}
