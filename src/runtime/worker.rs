/// Queue consumer for workflow jobs
///
/// `JobQueue` is the in-process transport (a bounded tokio mpsc channel);
/// `Worker` drains it, running each job in its own task under a semaphore so
/// at most `max_concurrent` executions are in flight. Paused executions that
/// carry a `resumeAt` are re-enqueued as resume jobs when that instant arrives.

use crate::{
    runtime::engine::{ExecutionResult, WorkflowExecutor},
    workflow::types::{ExecutionContext, ExecutionStatus, Job},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, Semaphore};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Sending half of the job channel
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Queue and the receiver a `Worker` consumes
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        tracing::debug!(
            "📬 Enqueued job for workflow {} (resume: {})",
            job.workflow_id,
            job.execution_id.is_some()
        );
        self.sender
            .send(job)
            .await
            .map_err(|_| anyhow::anyhow!("Job queue is closed"))
    }

    /// Enqueue `job` once `at` has passed
    pub fn schedule(&self, job: Job, at: DateTime<Utc>) {
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let queue = self.clone();

        tracing::info!(
            "⏰ Scheduled resume of execution {} in {:?}",
            job.execution_id.as_deref().unwrap_or("?"),
            delay
        );

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = queue.enqueue(job).await {
                tracing::error!("❌ Failed to enqueue scheduled resume: {}", e);
            }
        });
    }
}

#[derive(Clone)]
pub struct Worker {
    engine: Arc<WorkflowExecutor>,
    queue: JobQueue,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(engine: Arc<WorkflowExecutor>, queue: JobQueue, max_concurrent: usize) -> Self {
        Self {
            engine,
            queue,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Consume jobs for the lifetime of the process
    ///
    /// The worker keeps its own sender for scheduled resumes, so this only
    /// returns if the semaphore is closed.
    pub async fn run(self, mut receiver: mpsc::Receiver<Job>) {
        tracing::info!("👷 Worker started");

        while let Some(job) = receiver.recv().await {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = self.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let workflow_id = job.workflow_id.clone();
                if let Err(e) = worker.process(job).await {
                    tracing::error!("❌ Job for workflow {} aborted: {:#}", workflow_id, e);
                }
            });
        }

        tracing::info!("👷 Worker stopped");
    }

    /// Handle one job in fresh or resume mode
    ///
    /// Returns `None` when the job was ignored: unknown workflow, an execution
    /// that is not paused, or a pause another job already claimed.
    pub async fn process(&self, job: Job) -> Result<Option<ExecutionResult>> {
        let store = self.engine.store();

        let Some(workflow) = store.load_workflow(&job.workflow_id).await? else {
            tracing::warn!("⚠️ Ignoring job for unknown workflow: {}", job.workflow_id);
            return Ok(None);
        };

        let resume_from = match &job.execution_id {
            None => None,
            Some(execution_id) => {
                let Some(execution) = store.get_execution(execution_id).await? else {
                    tracing::warn!("⚠️ Ignoring resume for unknown execution: {}", execution_id);
                    return Ok(None);
                };
                if execution.workflow_id != workflow.id {
                    tracing::warn!(
                        "⚠️ Ignoring resume: execution {} belongs to workflow {}, not {}",
                        execution_id,
                        execution.workflow_id,
                        workflow.id
                    );
                    return Ok(None);
                }
                if execution.status != ExecutionStatus::Paused {
                    tracing::warn!(
                        "⚠️ Ignoring resume of execution {}: status is {}",
                        execution_id,
                        execution.status
                    );
                    return Ok(None);
                }
                // Another job may have taken this pause since the read above
                if !store.claim_resume(execution_id).await? {
                    tracing::warn!(
                        "⚠️ Ignoring resume of execution {}: already claimed by another job",
                        execution_id
                    );
                    return Ok(None);
                }
                Some(execution)
            }
        };

        let context = match job.trigger_payload {
            Some(payload) if resume_from.is_none() => ExecutionContext::from_payload(payload),
            _ => ExecutionContext::new(),
        };

        let result = self
            .engine
            .run(&workflow, &workflow.steps, context, resume_from)
            .await?;

        if let (ExecutionStatus::Paused, Some(at)) = (result.status, result.resume_at) {
            self.queue
                .schedule(Job::resume(&workflow.id, &result.execution_id), at);
        }

        Ok(Some(result))
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::StepError,
        runtime::{notification::LogNotifier, retry::RetryPolicy},
        steps::{StepExecutor, StepExecutorRegistry, StepOutcome},
        workflow::{
            memory::InMemoryStore,
            storage::ExecutionStore,
            types::{Execution, Step, Workflow, WorkflowStatus},
        },
    };
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and yields so concurrent jobs interleave
    struct CountingNode {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl StepExecutor for CountingNode {
        async fn execute(
            &self,
            _config: &Map<String, Value>,
            _context: &ExecutionContext,
        ) -> std::result::Result<StepOutcome, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(StepOutcome::from_value(json!({ "counted": true })))
        }
    }

    async fn setup(steps: Vec<Step>) -> (Worker, Arc<InMemoryStore>, mpsc::Receiver<Job>) {
        setup_with(StepExecutorRegistry::new(), steps).await
    }

    async fn setup_with(
        registry: StepExecutorRegistry,
        steps: Vec<Step>,
    ) -> (Worker, Arc<InMemoryStore>, mpsc::Receiver<Job>) {
        let store = Arc::new(InMemoryStore::new());
        store
            .save_workflow(&Workflow {
                id: "wf".to_string(),
                name: "worker test".to_string(),
                status: WorkflowStatus::Active,
                trigger: None,
                steps,
            })
            .await
            .unwrap();

        let engine = Arc::new(WorkflowExecutor::new(
            Arc::new(registry),
            store.clone(),
            Arc::new(LogNotifier),
            RetryPolicy::no_retry(),
        ));
        let (queue, receiver) = JobQueue::new(8);
        (Worker::new(engine, queue, 2), store, receiver)
    }

    fn step(id: &str, order: u32, config: Value) -> Step {
        Step {
            id: id.to_string(),
            step_type: "noop".to_string(),
            config,
            order,
        }
    }

    #[tokio::test]
    async fn test_fresh_job_runs_with_payload() {
        let (worker, store, _rx) = setup(vec![step("s0", 0, json!({ "echo": "{{name}}" }))]).await;

        let result = worker
            .process(Job::fresh("wf", json!({ "name": "Ada" })))
            .await
            .unwrap()
            .unwrap();

        assert!(result.success);
        assert_eq!(result.context.get("echo"), Some(&json!("Ada")));
        let execution = store.get_execution(&result.execution_id).await.unwrap().unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_workflow_is_ignored() {
        let (worker, store, _rx) = setup(Vec::new()).await;
        assert_eq!(worker.process(Job::fresh("missing", json!({}))).await.unwrap(), None);
        assert_eq!(store.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_resume_of_completed_execution_is_ignored() {
        let (worker, store, _rx) = setup(vec![step("s0", 0, json!({}))]).await;

        let mut done = Execution::new("wf", ExecutionContext::new());
        done.status = ExecutionStatus::Completed;
        store.create_execution(&done).await.unwrap();

        assert_eq!(worker.process(Job::resume("wf", &done.id)).await.unwrap(), None);
        assert!(store.list_logs(&done.id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resumes_run_the_step_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = StepExecutorRegistry::new();
        registry.register("count", Arc::new(CountingNode { calls: calls.clone() }));
        let (worker, store, _rx) = setup_with(
            registry,
            vec![Step {
                id: "s0".to_string(),
                step_type: "count".to_string(),
                config: json!({}),
                order: 0,
            }],
        )
        .await;

        let mut paused = Execution::new("wf", ExecutionContext::new());
        paused.status = ExecutionStatus::Paused;
        paused.current_step_order = Some(0);
        store.create_execution(&paused).await.unwrap();

        let jobs: Vec<_> = (0..2)
            .map(|_| {
                let worker = worker.clone();
                let job = Job::resume("wf", &paused.id);
                tokio::spawn(async move { worker.process(job).await.unwrap() })
            })
            .collect();

        let mut ran = 0;
        for job in jobs {
            if let Some(result) = job.await.unwrap() {
                assert!(result.success);
                ran += 1;
            }
        }

        assert_eq!(ran, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let logs = store.list_logs(&paused.id).await.unwrap();
        assert_eq!(logs.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_pause_is_resumed_through_the_queue() {
        let (worker, store, mut rx) = setup(vec![
            step("s0", 0, json!({})),
            step("s1", 1, json!({ "pause": { "delayMs": 5000 } })),
        ])
        .await;

        let paused = worker
            .process(Job::fresh("wf", json!({ "x": 1 })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);

        let job = rx.recv().await.unwrap();
        assert_eq!(job, Job::resume("wf", &paused.execution_id));

        let resumed = worker.process(job).await.unwrap().unwrap();
        assert!(resumed.success);
        assert_eq!(resumed.execution_id, paused.execution_id);
        assert_eq!(store.execution_count().await, 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue() {
        let (worker, store, rx) = setup(vec![step("s0", 0, json!({}))]).await;
        let queue = worker.queue.clone();
        let handle = tokio::spawn(worker.run(rx));

        queue.enqueue(Job::fresh("wf", json!({}))).await.unwrap();
        queue.enqueue(Job::fresh("wf", json!({}))).await.unwrap();

        for _ in 0..100 {
            if store.execution_count().await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.execution_count().await, 2);
        handle.abort();
    }
}
