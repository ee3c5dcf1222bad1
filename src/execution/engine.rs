//! Execution Engine (C6): orchestrates the job→pool→worker→execution
//! lifecycle and routes inbound worker frames to the right execution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::channel::{ArtifactRef, InboundHandler, LogChunkFrame, StatusUpdateFrame, WorkerCommunicationService};
use crate::channel::codec::map_event_type;
use crate::error::{EngineError, WorkerError};
use crate::events::EventBus;
use crate::model::{Execution, ExecutionEvent, ExecutionLog, Job, LogStream, ResourcePool};
use crate::repository::{JobRepository, TemplateRepository};
use crate::scheduler::SchedulingStrategy;
use crate::worker::{WorkerFactory, WorkerRegistry};

use super::definition::build_execution_definition;
use super::state_machine::{ExecutionState, ExecutionStateMachine};

const WORKER_REGISTRATION_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(30_000);

struct ExecutionMutable {
    job: Job,
    execution: Execution,
    events: Vec<ExecutionEvent>,
}

struct ExecutionContext {
    worker_id: String,
    state_machine: ExecutionStateMachine,
    mutable: Mutex<ExecutionMutable>,
}

/// Generates the process-scoped secret gating direct calls to
/// `startExecution` (spec.md §4.6, §6).
fn generate_orchestrator_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Owns every active execution's context and coordinates the Scheduler,
/// Worker Factory & Registry, and Worker Channel to run jobs to
/// completion.
pub struct ExecutionEngine {
    orchestrator_token: String,
    active: RwLock<HashMap<Uuid, Arc<ExecutionContext>>>,
    worker_to_execution: RwLock<HashMap<String, Uuid>>,
    job_repository: Arc<dyn JobRepository>,
    template_repository: Arc<dyn TemplateRepository>,
    worker_factory: Arc<dyn WorkerFactory>,
    worker_registry: Arc<WorkerRegistry>,
    strategy: Arc<dyn SchedulingStrategy>,
    transport: RwLock<Option<Arc<dyn WorkerCommunicationService>>>,
    events: Arc<EventBus>,
    registration_timeout: std::time::Duration,
}

impl ExecutionEngine {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        template_repository: Arc<dyn TemplateRepository>,
        worker_factory: Arc<dyn WorkerFactory>,
        worker_registry: Arc<WorkerRegistry>,
        strategy: Arc<dyn SchedulingStrategy>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            orchestrator_token: generate_orchestrator_token(),
            active: RwLock::new(HashMap::new()),
            worker_to_execution: RwLock::new(HashMap::new()),
            job_repository,
            template_repository,
            worker_factory,
            worker_registry,
            strategy,
            transport: RwLock::new(None),
            events,
            registration_timeout: WORKER_REGISTRATION_TIMEOUT,
        }
    }

    /// Overrides the default 30 s worker registration timeout (spec.md
    /// §4.6 names 30 s as the hard default; deployments may configure a
    /// different value via [`crate::config::OrchestratorConfig`]).
    pub fn with_registration_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    pub fn orchestrator_token(&self) -> &str {
        &self.orchestrator_token
    }

    /// Breaks the Engine↔Transport cycle: the concrete transport is
    /// injected after construction (spec.md §9).
    pub async fn set_transport(&self, transport: Arc<dyn WorkerCommunicationService>) {
        *self.transport.write().await = Some(transport);
    }

    async fn transport(&self) -> Result<Arc<dyn WorkerCommunicationService>, EngineError> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::RepositoryFailed("transport not yet attached".to_string()))
    }

    pub async fn active_executions(&self) -> Vec<Execution> {
        let active = self.active.read().await;
        let mut result = Vec::with_capacity(active.len());
        for ctx in active.values() {
            result.push(ctx.mutable.lock().await.execution.clone());
        }
        result
    }

    pub async fn execution_context(&self, id: Uuid) -> Option<(Execution, ExecutionState)> {
        let active = self.active.read().await;
        let ctx = active.get(&id)?;
        let execution = ctx.mutable.lock().await.execution.clone();
        Some((execution, ctx.state_machine.current()))
    }

    pub async fn subscribe(
        &self,
        execution_id: Uuid,
        filter: Option<std::collections::HashSet<crate::model::EventType>>,
    ) -> crate::events::Subscription {
        self.events.subscribe(execution_id, filter).await
    }

    pub async fn unsubscribe(&self, subscription_id: Uuid) {
        self.events.unsubscribe(subscription_id).await
    }

    /// Picks a pool for `job` among `pools` using the injected strategy,
    /// after filtering to candidates that actually fit (C1+C2 collaboration).
    pub fn select_pool(
        &self,
        job: &Job,
        candidates: &[crate::model::PoolCandidate],
    ) -> Result<ResourcePool, crate::error::SchedulingError> {
        let started_at = std::time::Instant::now();
        let result = self.strategy.select_pool(job, candidates);
        if let Some(histogram) = crate::metrics::SCHEDULING_LATENCY.get() {
            histogram.with_label_values(&[self.strategy.name()]).observe(started_at.elapsed().as_secs_f64());
        }
        if result.is_ok() {
            if let Some(counter) = crate::metrics::SCHEDULING_DECISIONS_TOTAL.get() {
                counter.with_label_values(&[self.strategy.name()]).inc();
            }
        }
        result
    }

    /// spec.md §4.6: the full `startExecution` algorithm.
    pub async fn start_execution(&self, job: Job, pool: ResourcePool, token: &str) -> Result<Execution, EngineError> {
        self.start_execution_with_timeout(job, pool, token, self.registration_timeout).await
    }

    async fn start_execution_with_timeout(
        &self,
        job: Job,
        pool: ResourcePool,
        token: &str,
        registration_timeout: std::time::Duration,
    ) -> Result<Execution, EngineError> {
        if token != self.orchestrator_token {
            return Err(EngineError::Unauthorized);
        }

        if let (Some(template_id), Some(_version)) = (&job.template_id, &job.template_version) {
            let template = self
                .template_repository
                .find_by_id(template_id)
                .await
                .ok_or_else(|| EngineError::TemplateInvalid(format!("template '{template_id}' not found")))?;
            if !template.is_published() {
                return Err(EngineError::TemplateInvalid(format!("template '{template_id}' is not published")));
            }
        }

        let dispatch_started_at = std::time::Instant::now();
        let worker = self.worker_factory.create_worker(&job, &pool).await?;
        self.worker_registry.track(worker.clone()).await;

        let registered = self
            .worker_registry
            .wait_for_worker_registration(&worker.id, registration_timeout)
            .await;

        if registered.is_none() {
            let _ = self.worker_factory.destroy_worker(&worker).await;
            self.worker_registry.mark_destroyed(&worker.id).await;
            if let Some(counter) = crate::metrics::REGISTRATION_TIMEOUTS_TOTAL.get() {
                counter.inc();
            }
            return Err(EngineError::Worker(WorkerError::RegistrationTimeout));
        }

        if let Some(histogram) = crate::metrics::ASSIGNMENT_LATENCY.get() {
            histogram.observe(dispatch_started_at.elapsed().as_secs_f64());
        }

        let execution = Execution::new(job.id, worker.id.clone());
        let execution_id = execution.id;
        let state_machine = ExecutionStateMachine::new();

        let context = Arc::new(ExecutionContext {
            worker_id: worker.id.clone(),
            state_machine,
            mutable: Mutex::new(ExecutionMutable { job: job.clone(), execution: execution.clone(), events: Vec::new() }),
        });

        self.active.write().await.insert(execution_id, context.clone());
        self.worker_to_execution.write().await.insert(worker.id.clone(), execution_id);
        self.spawn_status_mirror(execution_id, context.clone());

        if !self.worker_registry.assign_worker_to_execution(&worker.id, &execution_id.to_string()).await {
            self.teardown_failed_execution(execution_id, &worker).await;
            return Err(EngineError::Worker(WorkerError::AssignmentFailed(worker.id.clone())));
        }

        let definition = build_execution_definition(&job);
        let transport = self.transport().await?;
        let send_result = transport
            .send_execution_assignment(&worker.id, execution_id, definition, Vec::<ArtifactRef>::new())
            .await;

        if let Err(e) = send_result {
            self.teardown_failed_execution(execution_id, &worker).await;
            return Err(EngineError::Channel(e));
        }

        context
            .state_machine
            .transition_to(ExecutionState::Assigned, Some(execution_id.to_string()), true, HashMap::new());

        if let Some(gauge) = crate::metrics::EXECUTIONS_IN_PROGRESS.get() {
            gauge.inc();
        }

        Ok(execution)
    }

    async fn teardown_failed_execution(&self, execution_id: Uuid, worker: &crate::model::WorkerInstance) {
        self.active.write().await.remove(&execution_id);
        self.worker_to_execution.write().await.remove(&worker.id);
        let _ = self.worker_factory.destroy_worker(worker).await;
        self.worker_registry.mark_destroyed(&worker.id).await;
    }

    /// Installs the reactive subscriber mirroring FSM state into
    /// `Job.status`, idempotently (spec.md §4.6 step 4).
    fn spawn_status_mirror(&self, _execution_id: Uuid, context: Arc<ExecutionContext>) {
        let job_repository = self.job_repository.clone();
        let mut receiver = context.state_machine.subscribe();
        tokio::spawn(async move {
            loop {
                let state = *receiver.borrow_and_update();
                if !state.is_terminal() {
                    let mut mutable = context.mutable.lock().await;
                    if mutable.job.mirror_status(state.job_status()) {
                        if let Err(e) = job_repository.update(mutable.job.clone()).await {
                            tracing::warn!(error = %e, "job status mirror write failed");
                        }
                    }
                }
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        });
    }

    pub async fn cancel_execution(&self, execution_id: Uuid, reason: &str) -> Result<(), EngineError> {
        let active = self.active.read().await;
        let context = active.get(&execution_id).ok_or_else(|| EngineError::UnknownExecution(execution_id.to_string()))?;
        let worker_id = context.worker_id.clone();
        drop(active);

        let transport = self.transport().await?;
        transport.send_cancel_signal(&worker_id, reason).await.map_err(EngineError::Channel)
    }

    async fn context_for(&self, execution_id: Uuid) -> Option<Arc<ExecutionContext>> {
        self.active.read().await.get(&execution_id).cloned()
    }
}

#[async_trait]
impl InboundHandler for ExecutionEngine {
    async fn active_execution_for_worker(&self, worker_id: &str) -> Option<Uuid> {
        self.worker_to_execution.read().await.get(worker_id).copied()
    }

    async fn handle_status_update(&self, execution_id: Uuid, frame: StatusUpdateFrame) {
        let Some(context) = self.context_for(execution_id).await else {
            tracing::warn!(%execution_id, "status_update for unknown execution, dropping");
            return;
        };

        if context.state_machine.current() == ExecutionState::Assigned {
            let event_type = map_event_type(frame.event_type_tag);
            if matches!(event_type, crate::model::EventType::StageStarted | crate::model::EventType::StepStarted) {
                context.state_machine.transition_to(ExecutionState::Started, None, false, HashMap::new());
            }
        }

        let event_type = map_event_type(frame.event_type_tag);
        let mut event = ExecutionEvent::new(execution_id, event_type, frame.message);
        event.stage = frame.stage;
        event.step = frame.step;

        {
            let mut mutable = context.mutable.lock().await;
            mutable.events.push(event.clone());
        }

        self.events.notify_event(execution_id, event).await;
    }

    async fn handle_log_chunk(&self, execution_id: Uuid, frame: LogChunkFrame) {
        if self.context_for(execution_id).await.is_none() {
            tracing::warn!(%execution_id, "log_chunk for unknown execution, dropping");
            return;
        }

        let stream = if frame.is_stderr { LogStream::Stderr } else { LogStream::Stdout };
        let mut log = ExecutionLog::new(execution_id, stream, frame.content);
        log.stage = frame.stage;
        log.step = frame.step;

        self.events.notify_log(execution_id, log).await;
    }

    async fn handle_execution_result(
        &self,
        execution_id: Uuid,
        success: bool,
        exit_code: i32,
        details: String,
    ) -> Result<(), EngineError> {
        let Some(context) = self.context_for(execution_id).await else {
            return Err(EngineError::UnknownExecution(execution_id.to_string()));
        };

        let target = if success { ExecutionState::Completed } else { ExecutionState::Failed };
        let transitioned = context.state_machine.transition_to(target, None, false, HashMap::new());

        if !transitioned {
            // Already terminal: a previous arrival already did the
            // one-and-only terminal write (P3). Nothing further to do.
            return Ok(());
        }

        let worker_id = context.worker_id.clone();

        let job_snapshot = {
            let mut mutable = context.mutable.lock().await;
            if success {
                mutable.execution.mark_success(exit_code);
                mutable.job.complete();
            } else {
                mutable.execution.mark_failed(Some(exit_code), details.clone());
                mutable.job.fail(details.clone());
            }
            mutable.job.clone()
        };

        if let Err(e) = self.job_repository.update(job_snapshot).await {
            tracing::warn!(%execution_id, error = %e, "terminal job write failed");
        }

        if let Some(gauge) = crate::metrics::EXECUTIONS_IN_PROGRESS.get() {
            gauge.dec();
        }
        if let Some(counter) = crate::metrics::EXECUTIONS_TOTAL.get() {
            counter.with_label_values(&[if success { "completed" } else { "failed" }]).inc();
        }

        self.worker_registry.release_worker(&worker_id).await;
        self.active.write().await.remove(&execution_id);
        self.worker_to_execution.write().await.remove(&worker_id);
        self.events.cleanup_execution(execution_id).await;

        let worker_factory = self.worker_factory.clone();
        let worker_registry = self.worker_registry.clone();
        let worker_snapshot = self.worker_registry.snapshot(&worker_id).await;
        tokio::spawn(async move {
            if let Some(worker) = worker_snapshot {
                if let Err(e) = worker_factory.destroy_worker(&worker).await {
                    tracing::warn!(worker_id = %worker.id, error = %e, "worker destruction failed");
                }
            }
            worker_registry.mark_destroyed(&worker_id).await;
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::model::WorkerInstance;
    use crate::repository::{InMemoryJobRepository, InMemoryTemplateRepository};
    use crate::scheduler::LeastLoaded;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeFactory {
        next_id: StdMutex<u32>,
        should_register: bool,
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
            if self.should_register {
                let registry = self.registry.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    registry.register_worker(&id).await;
                });
            }
            Ok(worker)
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
        cancelled: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl WorkerCommunicationService for FakeTransport {
        async fn send_execution_assignment(
            &self,
            worker_id: &str,
            execution_id: Uuid,
            _definition: crate::execution::definition::ExecutionDefinition,
            _required_artifacts: Vec<ArtifactRef>,
        ) -> Result<(), ChannelError> {
            self.sent.lock().unwrap().push((worker_id.to_string(), execution_id));
            Ok(())
        }

        async fn send_cancel_signal(&self, worker_id: &str, reason: &str) -> Result<(), ChannelError> {
            self.cancelled.lock().unwrap().push((worker_id.to_string(), reason.to_string()));
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

    fn pool_and_job() -> (ResourcePool, Job) {
        let pool = ResourcePool::new("p1", "p1", "docker");
        let mut job = Job::new("demo", "alice");
        let mut reqs = HashMap::new();
        reqs.insert("cpu".to_string(), "1".to_string());
        reqs.insert("memory".to_string(), "1Gi".to_string());
        job.resource_requirements = reqs;
        job.task = crate::model::TaskSpec::Shell { commands: vec!["echo hi".to_string()] };
        (pool, job)
    }

    async fn make_engine(should_register: bool) -> (Arc<ExecutionEngine>, Arc<FakeTransport>) {
        let registry = Arc::new(WorkerRegistry::new());
        let factory = Arc::new(FakeFactory { next_id: StdMutex::new(0), should_register, registry: registry.clone() });
        let engine = Arc::new(ExecutionEngine::new(
            Arc::new(InMemoryJobRepository::new()),
            Arc::new(InMemoryTemplateRepository::new()),
            factory,
            registry,
            Arc::new(LeastLoaded::new()),
            Arc::new(EventBus::new()),
        ));
        let transport = Arc::new(FakeTransport::default());
        engine.set_transport(transport.clone()).await;
        (engine, transport)
    }

    #[tokio::test]
    async fn unauthorized_token_is_rejected() {
        let (engine, _transport) = make_engine(true).await;
        let (pool, job) = pool_and_job();
        let result = engine.start_execution(job, pool, "wrong-token").await;
        assert!(matches!(result, Err(EngineError::Unauthorized)));
    }

    #[tokio::test]
    async fn happy_path_assigns_and_completes() {
        let (engine, transport) = make_engine(true).await;
        let (pool, job) = pool_and_job();
        let token = engine.orchestrator_token().to_string();

        let execution = engine.start_execution(job, pool, &token).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let ctx = engine.context_for(execution.id).await.unwrap();
        assert_eq!(ctx.state_machine.current(), ExecutionState::Assigned);

        engine.handle_execution_result(execution.id, true, 0, String::new()).await.unwrap();

        assert!(engine.context_for(execution.id).await.is_none());
        let job_record = engine.job_repository.find_by_id(execution.job_id).await.unwrap();
        assert_eq!(job_record.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn registration_timeout_destroys_worker_and_persists_nothing() {
        let (engine, _transport) = make_engine(false).await;
        let (pool, job) = pool_and_job();
        let token = engine.orchestrator_token().to_string();

        let result = engine.start_execution_with_timeout(job, pool, &token, Duration::from_millis(20)).await;

        assert!(matches!(result, Err(EngineError::Worker(WorkerError::RegistrationTimeout))));
        assert!(engine.active_executions().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_execution_result_writes_job_exactly_once() {
        let (engine, _transport) = make_engine(true).await;
        let (pool, job) = pool_and_job();
        let token = engine.orchestrator_token().to_string();
        let execution = engine.start_execution(job, pool, &token).await.unwrap();

        assert!(engine.handle_execution_result(execution.id, true, 0, String::new()).await.is_ok());
        // Second arrival for the same execution: context is already gone,
        // so this surfaces as unknown rather than a duplicate write.
        assert!(engine.handle_execution_result(execution.id, true, 0, String::new()).await.is_err());
    }

    #[tokio::test]
    async fn cancel_execution_sends_signal_without_self_transitioning() {
        let (engine, transport) = make_engine(true).await;
        let (pool, job) = pool_and_job();
        let token = engine.orchestrator_token().to_string();
        let execution = engine.start_execution(job, pool, &token).await.unwrap();

        engine.cancel_execution(execution.id, "user requested").await.unwrap();

        assert_eq!(transport.cancelled.lock().unwrap().as_slice(), [("w1".to_string(), "user requested".to_string())]);

        // cancel_execution only asks the worker to stop; the execution
        // itself moves to CANCELLED only once the worker's own result
        // frame arrives (spec.md §4.6).
        let ctx = engine.context_for(execution.id).await.unwrap();
        assert_eq!(ctx.state_machine.current(), ExecutionState::Assigned);
    }

    #[tokio::test]
    async fn cancel_execution_on_unknown_id_is_an_error() {
        let (engine, _transport) = make_engine(true).await;
        let result = engine.cancel_execution(Uuid::new_v4(), "reason").await;
        assert!(matches!(result, Err(EngineError::UnknownExecution(_))));
    }
}
