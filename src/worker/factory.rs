//! Worker Factory (C3, provisioning half): starts and stops worker
//! processes on a backend (currently Docker).

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use uuid::Uuid;

use crate::error::WorkerError;
use crate::model::{Job, ResourcePool, WorkerInstance};

/// Provisions and tears down worker instances on a given pool type.
#[async_trait]
pub trait WorkerFactory: Send + Sync {
    /// Starts a worker process on `pool`'s backend and returns immediately
    /// with the id the worker will use to register (spec.md §4.3).
    async fn create_worker(&self, job: &Job, pool: &ResourcePool) -> Result<WorkerInstance, WorkerError>;

    /// Tears down a previously created worker. Idempotent.
    async fn destroy_worker(&self, worker: &WorkerInstance) -> Result<(), WorkerError>;

    fn supports_pool_type(&self, tag: &str) -> bool;
}

/// Docker-backed [`WorkerFactory`]: one container per worker, running the
/// worker-runtime image with the orchestrator's channel address injected.
pub struct DockerWorkerFactory {
    docker: Docker,
    worker_image: String,
    channel_endpoint: String,
}

impl DockerWorkerFactory {
    pub fn new(docker: Docker, worker_image: impl Into<String>, channel_endpoint: impl Into<String>) -> Self {
        Self {
            docker,
            worker_image: worker_image.into(),
            channel_endpoint: channel_endpoint.into(),
        }
    }

    pub fn connect_local(worker_image: impl Into<String>, channel_endpoint: impl Into<String>) -> Result<Self, WorkerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| WorkerError::CreationFailed(format!("Docker daemon unavailable: {e}")))?;
        Ok(Self::new(docker, worker_image, channel_endpoint))
    }
}

#[async_trait]
impl WorkerFactory for DockerWorkerFactory {
    async fn create_worker(&self, _job: &Job, pool: &ResourcePool) -> Result<WorkerInstance, WorkerError> {
        if !self.supports_pool_type(&pool.pool_type) {
            return Err(WorkerError::UnsupportedPoolType(pool.pool_type.clone()));
        }

        let worker_id = format!("worker-{}", Uuid::new_v4());

        let host_config = HostConfig {
            auto_remove: Some(true),
            ..Default::default()
        };

        let config = Config {
            image: Some(self.worker_image.clone()),
            env: Some(vec![
                format!("HODEI_WORKER_ID={worker_id}"),
                format!("HODEI_CHANNEL_ENDPOINT={}", self.channel_endpoint),
            ]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: worker_id.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| WorkerError::CreationFailed(format!("Failed to create container: {e}")))?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| WorkerError::CreationFailed(format!("Failed to start container: {e}")))?;

        Ok(WorkerInstance::new(worker_id, pool.id.clone(), pool.pool_type.clone())
            .with_backend_handle(response.id))
    }

    async fn destroy_worker(&self, worker: &WorkerInstance) -> Result<(), WorkerError> {
        let Some(handle) = &worker.backend_handle else {
            return Ok(());
        };

        let stop_options = StopContainerOptions { t: 10 };
        if let Err(e) = self.docker.stop_container(handle, Some(stop_options)).await {
            tracing::warn!(worker_id = %worker.id, error = %e, "failed to stop worker container, attempting removal anyway");
        }

        match self
            .docker
            .remove_container(
                handle,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("No such container") => Ok(()),
            Err(e) => Err(WorkerError::DeletionFailed(e.to_string())),
        }
    }

    fn supports_pool_type(&self, tag: &str) -> bool {
        tag == "docker"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_only_docker() {
        // Constructing a real Docker client isn't needed to test the pure
        // predicate; build the struct with a dummy unix socket client.
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let factory = DockerWorkerFactory::new(docker, "hodei/worker:latest", "http://localhost:7070");
        assert!(factory.supports_pool_type("docker"));
        assert!(!factory.supports_pool_type("kubernetes"));
    }
}
