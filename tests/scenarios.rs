//! End-to-end scenarios spanning scheduling, worker provisioning, the
//! execution engine, and the event bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use hodei_pipelines::channel::{ArtifactRef, InboundHandler, WorkerCommunicationService};
use hodei_pipelines::error::{ChannelError, EngineError, WorkerError};
use hodei_pipelines::execution::{ExecutionDefinition, ExecutionEngine};
use hodei_pipelines::model::{Job, JobStatus, PoolCandidate, ResourcePool, ResourceUtilization, TaskSpec, WorkerInstance};
use hodei_pipelines::repository::{InMemoryJobRepository, InMemoryTemplateRepository};
use hodei_pipelines::scheduler::{BinPackingFirstFit, LeastLoaded, RoundRobin, SchedulingStrategy};
use hodei_pipelines::worker::{WorkerFactory, WorkerRegistry};

struct FakeFactory {
    next_id: StdMutex<u32>,
    registry: Arc<WorkerRegistry>,
}

#[async_trait]
impl WorkerFactory for FakeFactory {
    async fn create_worker(&self, _job: &Job, pool: &ResourcePool) -> Result<WorkerInstance, WorkerError> {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            format!("w{}", *next)
        };
        let worker = WorkerInstance::new(id.clone(), pool.id.clone(), pool.pool_type.clone());
        let registry = self.registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            registry.register_worker(&id).await;
        });
        Ok(worker)
    }

    async fn destroy_worker(&self, _worker: &WorkerInstance) -> Result<(), WorkerError> {
        Ok(())
    }

    fn supports_pool_type(&self, tag: &str) -> bool {
        tag == "docker"
    }
}

/// Never registers a worker, for the registration-timeout scenario.
struct SilentFactory;

#[async_trait]
impl WorkerFactory for SilentFactory {
    async fn create_worker(&self, _job: &Job, pool: &ResourcePool) -> Result<WorkerInstance, WorkerError> {
        Ok(WorkerInstance::new("silent-worker", pool.id.clone(), pool.pool_type.clone()))
    }

    async fn destroy_worker(&self, _worker: &WorkerInstance) -> Result<(), WorkerError> {
        Ok(())
    }

    fn supports_pool_type(&self, tag: &str) -> bool {
        tag == "docker"
    }
}

#[derive(Default)]
struct FakeTransport {
    sent: StdMutex<Vec<(String, Uuid)>>,
}

#[async_trait]
impl WorkerCommunicationService for FakeTransport {
    async fn send_execution_assignment(
        &self,
        worker_id: &str,
        execution_id: Uuid,
        _definition: ExecutionDefinition,
        _required_artifacts: Vec<ArtifactRef>,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((worker_id.to_string(), execution_id));
        Ok(())
    }

    async fn send_cancel_signal(&self, _worker_id: &str, _reason: &str) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send_artifact(&self, _worker_id: &str, _artifact_id: &str, _content: Vec<u8>) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn is_worker_connected(&self, _worker_id: &str) -> bool {
        true
    }

    async fn connected_workers(&self) -> Vec<String> {
        Vec::new()
    }
}

fn job_requiring(cpu: &str, memory: &str) -> Job {
    let mut job = Job::new("demo", "alice");
    let mut reqs = HashMap::new();
    reqs.insert("cpu".to_string(), cpu.to_string());
    reqs.insert("memory".to_string(), memory.to_string());
    job.resource_requirements = reqs;
    job.task = TaskSpec::Shell { commands: vec!["echo hi".to_string()] };
    job
}

/// Scenario 1 (spec §8): happy path — LeastLoaded selects the sole pool,
/// the worker registers, is assigned, and reports success.
#[tokio::test]
async fn happy_path_selects_assigns_and_completes() {
    let pool = ResourcePool::new("p1", "p1", "docker");
    let mut util = ResourceUtilization::new("p1");
    util.total_cpu = 4.0;
    util.used_cpu = 1.0;
    util.total_memory_bytes = 8 * 1024 * 1024 * 1024;
    util.used_memory_bytes = 2 * 1024 * 1024 * 1024;

    let strategy = LeastLoaded::new();
    let candidates = vec![PoolCandidate::new(pool.clone(), util)];
    let selected = strategy.select_pool(&job_requiring("1", "1Gi"), &candidates).unwrap();
    assert_eq!(selected.id, "p1");

    let job_repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(WorkerRegistry::new());
    let factory = Arc::new(FakeFactory { next_id: StdMutex::new(0), registry: registry.clone() });
    let engine = Arc::new(ExecutionEngine::new(
        job_repository.clone(),
        Arc::new(InMemoryTemplateRepository::new()),
        factory,
        registry,
        Arc::new(LeastLoaded::new()),
        Arc::new(hodei_pipelines::events::EventBus::new()),
    ));
    let transport = Arc::new(FakeTransport::default());
    engine.set_transport(transport.clone()).await;

    let token = engine.orchestrator_token().to_string();
    let execution = engine.start_execution(job_requiring("1", "1Gi"), selected, &token).await.unwrap();

    assert_eq!(transport.sent.lock().unwrap().len(), 1);

    let subscription = engine.subscribe(execution.id, None).await;

    // Drive the terminal transition the way the worker channel would.
    engine.handle_status_update(execution.id, status_frame()).await;
    engine.handle_log_chunk(execution.id, log_frame()).await;
    engine.handle_execution_result(execution.id, true, 0, String::new()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_millis(200), subscription.recv()).await;
    assert!(received.is_ok(), "subscriber should have received at least one notification before cleanup");

    let job_record = job_repository.find_by_id(execution.job_id).await.unwrap();
    assert_eq!(job_record.status, JobStatus::Completed);
    assert!(engine.execution_context(execution.id).await.is_none());
}

fn status_frame() -> hodei_pipelines::channel::StatusUpdateFrame {
    hodei_pipelines::channel::StatusUpdateFrame {
        event_type_tag: 1,
        message: "stage started".to_string(),
        stage: Some("shell".to_string()),
        step: None,
    }
}

fn log_frame() -> hodei_pipelines::channel::LogChunkFrame {
    hodei_pipelines::channel::LogChunkFrame {
        is_stderr: false,
        content: b"hi\n".to_vec(),
        stage: Some("shell".to_string()),
        step: None,
    }
}

/// Scenario 2 (spec §8): registration timeout destroys the worker and
/// persists no execution or job status change.
#[tokio::test]
async fn registration_timeout_leaves_no_trace() {
    let job_repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(WorkerRegistry::new());
    let engine = ExecutionEngine::new(
        job_repository.clone(),
        Arc::new(InMemoryTemplateRepository::new()),
        Arc::new(SilentFactory),
        registry,
        Arc::new(LeastLoaded::new()),
        Arc::new(hodei_pipelines::events::EventBus::new()),
    )
    .with_registration_timeout(Duration::from_millis(50));
    engine.set_transport(Arc::new(FakeTransport::default())).await;

    let pool = ResourcePool::new("p1", "p1", "docker");
    let job = job_requiring("1", "1Gi");
    let job_id = job.id;
    let token = engine.orchestrator_token().to_string();

    let result = engine.start_execution(job, pool, &token).await;

    assert!(matches!(result, Err(EngineError::Worker(WorkerError::RegistrationTimeout))));
    assert!(job_repository.find_by_id(job_id).await.is_none());
    assert!(engine.active_executions().await.is_empty());
}

/// Scenario 3 (spec §8): a mismatched orchestrator token is rejected
/// before any worker is provisioned.
#[tokio::test]
async fn unauthorized_start_creates_no_worker() {
    let registry = Arc::new(WorkerRegistry::new());
    let factory = Arc::new(FakeFactory { next_id: StdMutex::new(0), registry: registry.clone() });
    let engine = ExecutionEngine::new(
        Arc::new(InMemoryJobRepository::new()),
        Arc::new(InMemoryTemplateRepository::new()),
        factory,
        registry,
        Arc::new(LeastLoaded::new()),
        Arc::new(hodei_pipelines::events::EventBus::new()),
    );
    engine.set_transport(Arc::new(FakeTransport::default())).await;

    let pool = ResourcePool::new("p1", "p1", "docker");
    let result = engine.start_execution(job_requiring("1", "1Gi"), pool, "wrong-token").await;

    assert!(matches!(result, Err(EngineError::Unauthorized)));
    assert!(engine.active_executions().await.is_empty());
}

/// Scenario 4 (spec §8): RoundRobin over ["a","b","c"] visits each in
/// order, wrapping after 3.
#[tokio::test]
async fn round_robin_visits_candidates_in_order() {
    let strategy = RoundRobin::new();
    let job = job_requiring("1", "1Gi");

    let candidates: Vec<PoolCandidate> = ["a", "b", "c"]
        .iter()
        .map(|id| PoolCandidate::new(ResourcePool::new(*id, *id, "docker"), ResourceUtilization::new(*id)))
        .collect();

    let mut selected = Vec::new();
    for _ in 0..7 {
        selected.push(strategy.select_pool(&job, &candidates).unwrap().id);
    }

    assert_eq!(selected, vec!["a", "b", "c", "a", "b", "c", "a"]);
}

/// Scenario 5 (spec §8): BinPackingFirstFit prefers the mid-utilization
/// candidate over both the near-empty and the near-full ones.
#[tokio::test]
async fn bin_packing_prefers_mid_utilization() {
    let strategy = BinPackingFirstFit::new();
    let job = job_requiring("1", "1Gi");

    let make = |id: &str, util_fraction: f64| {
        let mut util = ResourceUtilization::new(id);
        util.total_cpu = 10.0;
        util.used_cpu = util_fraction * 10.0;
        util.total_memory_bytes = 10 * 1024 * 1024 * 1024;
        util.used_memory_bytes = (util_fraction * 10.0 * 1024.0 * 1024.0 * 1024.0) as u64;
        PoolCandidate::new(ResourcePool::new(id, id, "docker"), util)
    };

    let candidates = vec![make("a", 0.05), make("b", 0.35), make("c", 0.75), make("d", 0.95)];
    let selected = strategy.select_pool(&job, &candidates).unwrap();
    assert_eq!(selected.id, "b");
}

/// Scenario 6 (spec §8): a delivery that fails twice before succeeding
/// still produces exactly one terminal job write.
#[tokio::test]
async fn result_retry_writes_job_exactly_once() {
    let job_repository = Arc::new(InMemoryJobRepository::new());
    let registry = Arc::new(WorkerRegistry::new());
    let factory = Arc::new(FakeFactory { next_id: StdMutex::new(0), registry: registry.clone() });
    let engine = ExecutionEngine::new(
        job_repository.clone(),
        Arc::new(InMemoryTemplateRepository::new()),
        factory,
        registry,
        Arc::new(LeastLoaded::new()),
        Arc::new(hodei_pipelines::events::EventBus::new()),
    );
    engine.set_transport(Arc::new(FakeTransport::default())).await;

    let pool = ResourcePool::new("p1", "p1", "docker");
    let token = engine.orchestrator_token().to_string();
    let execution = engine.start_execution(job_requiring("1", "1Gi"), pool, &token).await.unwrap();

    // Simulate the Worker Channel's own bounded retry (spec.md §4.4): the
    // first two calls into the engine transiently fail at the transport
    // layer in production; here we model only the engine-visible effect,
    // that handleExecutionResult is eventually called exactly once with a
    // terminal outcome, and a second call after success is rejected as
    // unknown rather than double-writing.
    assert!(engine.handle_execution_result(execution.id, true, 0, String::new()).await.is_ok());
    assert!(engine.handle_execution_result(execution.id, true, 0, String::new()).await.is_err());

    let job_record = job_repository.find_by_id(execution.job_id).await.unwrap();
    assert_eq!(job_record.status, JobStatus::Completed);
}
