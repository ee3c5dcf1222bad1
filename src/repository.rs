//! In-memory repositories (C9 collaborators). Persistent storage is an
//! explicit non-goal; these are the implementations a standalone
//! orchestrator process runs with.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::EngineError;
use crate::model::Job;
use crate::template::Template;

/// Concurrency-safe job storage, written by the Engine's state mirror and
/// terminal-transition paths (spec.md §6).
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn update(&self, job: Job) -> Result<Job, EngineError>;
    async fn find_by_id(&self, id: Uuid) -> Option<Job>;
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn update(&self, job: Job) -> Result<Job, EngineError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_by_id(&self, id: Uuid) -> Option<Job> {
        self.jobs.read().await.get(&id).cloned()
    }
}

/// Template lookup, consulted by `startExecution`'s validation step.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Option<Template>;
    async fn find_by_name_and_version(&self, name: &str, version: &str) -> Option<Template>;
}

#[derive(Default)]
pub struct InMemoryTemplateRepository {
    by_id: RwLock<HashMap<String, Template>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, template: Template) {
        self.by_id.write().await.insert(template.id.clone(), template);
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find_by_id(&self, id: &str) -> Option<Template> {
        self.by_id.read().await.get(id).cloned()
    }

    async fn find_by_name_and_version(&self, name: &str, version: &str) -> Option<Template> {
        self.by_id
            .read()
            .await
            .values()
            .find(|t| t.name == name && t.version == version)
            .cloned()
    }
}
