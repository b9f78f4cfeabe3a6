/// Sequential workflow execution engine
///
/// Drives one execution through its ordered steps: template each step's
/// config against the accumulated context, invoke the registered executor
/// under the step's retry policy, merge its output, and persist every state
/// transition. A step that exhausts its attempts fails the execution; a pause
/// (requested by policy or by the executor) persists the position so a later
/// resume job continues from the same step.

use crate::{
    error::StepError,
    runtime::{
        logger::ExecutionLogger,
        notification::{self, NotificationStatus, Notifier},
        retry::{RetryPolicy, RETRY_CONFIG_KEY},
        template,
    },
    steps::{PauseRequest, StepExecutorRegistry, StepOutcome},
    workflow::{
        storage::ExecutionStore,
        types::{
            Execution, ExecutionContext, ExecutionStatus, LogEvent, LogMetadata, Step, Workflow,
            WorkflowStatus,
        },
    },
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Step config key holding a pause policy
pub const PAUSE_CONFIG_KEY: &str = "pause";

/// Terminal (or paused) outcome of one `run`
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// True only when every step completed
    pub success: bool,
    pub context: ExecutionContext,
    pub error: Option<String>,
    /// Set when a paused execution should be resumed automatically
    pub resume_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    fn from_execution(execution: &Execution) -> Self {
        Self {
            execution_id: execution.id.clone(),
            status: execution.status,
            success: execution.status == ExecutionStatus::Completed,
            context: execution.context.clone(),
            error: execution.error.clone(),
            resume_at: execution.resume_at,
        }
    }
}

/// How a single step ended
enum StepResult {
    Completed,
    Paused(PauseRequest),
    Failed { error: StepError, retry_count: u32 },
}

pub struct WorkflowExecutor {
    registry: Arc<StepExecutorRegistry>,
    store: Arc<dyn ExecutionStore>,
    logger: ExecutionLogger,
    notifier: Arc<dyn Notifier>,
    default_retry: RetryPolicy,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<StepExecutorRegistry>,
        store: Arc<dyn ExecutionStore>,
        notifier: Arc<dyn Notifier>,
        default_retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            logger: ExecutionLogger::new(Arc::clone(&store)),
            store,
            notifier,
            default_retry,
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.store
    }

    /// Run a workflow to completion, failure or pause
    ///
    /// Without `resume_from` a new execution is created and seeded with
    /// `initial_context`. With it, the persisted execution continues from its
    /// `current_step_order` using its persisted context; `initial_context` is
    /// ignored. Errors are returned only for persistence failures; step
    /// failures are reported through the result.
    pub async fn run(
        &self,
        workflow: &Workflow,
        steps: &[Step],
        initial_context: ExecutionContext,
        resume_from: Option<Execution>,
    ) -> Result<ExecutionResult> {
        let mut steps = steps.to_vec();
        steps.sort_by_key(|s| s.order);

        let resumed = resume_from.is_some();
        let mut execution = match resume_from {
            Some(mut execution) => {
                tracing::info!(
                    "▶️ Resuming execution {} of workflow {} at step order {:?}",
                    execution.id,
                    workflow.id,
                    execution.current_step_order
                );
                execution.status = ExecutionStatus::Running;
                execution.error = None;
                execution.paused_at = None;
                execution.resume_at = None;
                self.persist(&mut execution).await?;
                execution
            }
            None => {
                let execution = Execution::new(&workflow.id, initial_context);
                self.store.create_execution(&execution).await?;
                tracing::info!(
                    "🚀 Starting execution {} of workflow {} ({} steps)",
                    execution.id,
                    workflow.id,
                    steps.len()
                );
                execution
            }
        };

        if workflow.status == WorkflowStatus::Draft {
            tracing::debug!("📝 Workflow {} is a draft; running anyway", workflow.id);
        }

        let start = match execution.current_step_order.filter(|_| resumed) {
            Some(order) => steps.iter().position(|s| s.order >= order).unwrap_or(steps.len()),
            None => 0,
        };

        for (index, step) in steps.iter().enumerate().skip(start) {
            execution.current_step_order = Some(step.order);
            self.persist(&mut execution).await?;

            // Resuming into a step satisfies its pause policy
            let entering_after_resume = resumed && index == start;
            let result = if entering_after_resume {
                self.run_step(&mut execution, step).await
            } else {
                match pause_policy(&step.config, &execution.context) {
                    Ok(Some(request)) => StepResult::Paused(request),
                    Ok(None) => self.run_step(&mut execution, step).await,
                    Err(error) => StepResult::Failed { error, retry_count: 0 },
                }
            };

            match result {
                StepResult::Completed => {}
                StepResult::Paused(request) => {
                    return self.pause(workflow, &steps, execution, step, request).await;
                }
                StepResult::Failed { error, retry_count } => {
                    return self
                        .fail(workflow, &steps, execution, step, error, retry_count)
                        .await;
                }
            }
        }

        execution.status = ExecutionStatus::Completed;
        execution.current_step_order = None;
        self.persist(&mut execution).await?;

        tracing::info!(
            "✅ Execution {} of workflow {} completed ({} context keys)",
            execution.id,
            workflow.id,
            execution.context.len()
        );
        Ok(ExecutionResult::from_execution(&execution))
    }

    /// Invoke one step under its retry policy and merge its output on success
    async fn run_step(&self, execution: &mut Execution, step: &Step) -> StepResult {
        let execution_id = execution.id.clone();
        self.logger
            .append(&execution_id, &step.id, step.order, LogEvent::Started, None)
            .await;

        let executor = match self.registry.resolve(&step.step_type) {
            Ok(executor) => executor,
            Err(error) => return StepResult::Failed { error, retry_count: 0 },
        };

        let policy = RetryPolicy::for_step(&step.config, &self.default_retry);
        let raw_config = executor_config(&step.config);
        let mut retries = 0u32;

        tracing::debug!(
            "⚙️ Executing step {} (type: {}, order: {})",
            step.id,
            step.step_type,
            step.order
        );

        loop {
            let config = template::render_map(&raw_config, &execution.context);

            match executor.execute(&config, &execution.context).await {
                Ok(StepOutcome::Completed(output)) => {
                    let output_keys = output.len();
                    execution.context.merge(output);
                    self.logger
                        .append(&execution_id, &step.id, step.order, LogEvent::Completed, None)
                        .await;
                    tracing::debug!("✅ Step {} completed ({} output keys)", step.id, output_keys);
                    return StepResult::Completed;
                }
                Ok(StepOutcome::Paused(request)) => return StepResult::Paused(request),
                Err(error) if error.is_retryable() && policy.should_retry(retries) => {
                    let delay = policy.delay_for(retries);
                    tracing::warn!(
                        "🔁 Step {} failed (attempt {}/{}), retrying in {:?}: {}",
                        step.id,
                        retries + 1,
                        policy.total_attempts(),
                        delay,
                        error
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                    self.logger
                        .append(
                            &execution_id,
                            &step.id,
                            step.order,
                            LogEvent::Retried,
                            Some(LogMetadata {
                                error: Some(error.message().to_string()),
                                retry_count: Some(retries),
                                resume_at: None,
                            }),
                        )
                        .await;
                }
                Err(error) => {
                    return StepResult::Failed {
                        error,
                        retry_count: retries,
                    }
                }
            }
        }
    }

    async fn pause(
        &self,
        workflow: &Workflow,
        steps: &[Step],
        mut execution: Execution,
        step: &Step,
        request: PauseRequest,
    ) -> Result<ExecutionResult> {
        let paused_at = Utc::now();
        self.logger
            .append(
                &execution.id,
                &step.id,
                step.order,
                LogEvent::Paused,
                Some(LogMetadata {
                    error: None,
                    retry_count: None,
                    resume_at: request.resume_at,
                }),
            )
            .await;

        execution.status = ExecutionStatus::Paused;
        execution.current_step_order = Some(step.order);
        execution.paused_at = Some(paused_at);
        execution.resume_at = request.resume_at;
        self.persist(&mut execution).await?;

        match request.resume_at {
            Some(at) => tracing::info!(
                "⏸️ Execution {} paused at step {} until {}",
                execution.id,
                step.id,
                at.to_rfc3339()
            ),
            None => tracing::info!(
                "⏸️ Execution {} paused at step {} until resumed manually",
                execution.id,
                step.id
            ),
        }

        let payload = notification::build(
            &workflow.id,
            &execution.id,
            NotificationStatus::Paused,
            execution.current_step_order,
            request.reason,
            execution.paused_at,
            execution.resume_at,
            steps,
        );
        self.notify(&payload).await;

        Ok(ExecutionResult::from_execution(&execution))
    }

    async fn fail(
        &self,
        workflow: &Workflow,
        steps: &[Step],
        mut execution: Execution,
        step: &Step,
        error: StepError,
        retry_count: u32,
    ) -> Result<ExecutionResult> {
        let message = error.message().to_string();
        self.logger
            .append(
                &execution.id,
                &step.id,
                step.order,
                LogEvent::Failed,
                Some(LogMetadata {
                    error: Some(message.clone()),
                    retry_count: Some(retry_count),
                    resume_at: None,
                }),
            )
            .await;

        execution.status = ExecutionStatus::Failed;
        execution.current_step_order = Some(step.order);
        execution.error = Some(message.clone());
        self.persist(&mut execution).await?;

        tracing::error!(
            "❌ Execution {} of workflow {} failed at step {} after {} retries: {}",
            execution.id,
            workflow.id,
            step.id,
            retry_count,
            error
        );

        let payload = notification::build(
            &workflow.id,
            &execution.id,
            NotificationStatus::Failed,
            execution.current_step_order,
            Some(message),
            None,
            None,
            steps,
        );
        self.notify(&payload).await;

        Ok(ExecutionResult::from_execution(&execution))
    }

    async fn notify(&self, payload: &notification::NotificationPayload) {
        if let Err(e) = self.notifier.dispatch(payload).await {
            tracing::warn!(
                "📣 Failed to deliver {} notification for execution {}: {}",
                payload.status.as_str(),
                payload.execution_id,
                e
            );
        }
    }

    async fn persist(&self, execution: &mut Execution) -> Result<()> {
        execution.updated_at = Utc::now();
        self.store.update_execution(execution).await
    }
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("registry", &self.registry)
            .field("default_retry", &self.default_retry)
            .finish()
    }
}

/// Step config as the executor sees it: reserved engine keys removed
fn executor_config(config: &Value) -> Map<String, Value> {
    let mut map = config.as_object().cloned().unwrap_or_default();
    map.remove(RETRY_CONFIG_KEY);
    map.remove(PAUSE_CONFIG_KEY);
    map
}

/// Pause requested by a step's `pause` key, if any
///
/// Accepts `true`, `{}`, `{"delayMs": n}` or `{"resumeAt": "<RFC 3339>"}`;
/// string values are templated first.
fn pause_policy(config: &Value, context: &ExecutionContext) -> Result<Option<PauseRequest>, StepError> {
    let Some(raw) = config.get(PAUSE_CONFIG_KEY) else {
        return Ok(None);
    };

    match template::render_value(raw, context) {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Bool(true) => Ok(Some(PauseRequest {
            resume_at: None,
            reason: Some("paused by step policy".to_string()),
        })),
        Value::Object(policy) => {
            let resume_at = match (policy.get("resumeAt"), policy.get("delayMs")) {
                (Some(Value::String(at)), _) => Some(
                    DateTime::parse_from_rfc3339(at)
                        .map_err(|e| {
                            StepError::config(format!("pause.resumeAt is not RFC 3339: {}", e))
                        })?
                        .with_timezone(&Utc),
                ),
                (Some(other), _) if !other.is_null() => {
                    return Err(StepError::config("pause.resumeAt must be a string"));
                }
                (_, Some(delay)) if !delay.is_null() => {
                    let ms = delay
                        .as_u64()
                        .and_then(|ms| i64::try_from(ms).ok())
                        .ok_or_else(|| StepError::config("pause.delayMs must be a non-negative integer"))?;
                    Some(Utc::now() + chrono::Duration::milliseconds(ms))
                }
                _ => None,
            };
            Ok(Some(PauseRequest {
                resume_at,
                reason: Some("paused by step policy".to_string()),
            }))
        }
        _ => Err(StepError::config("pause must be a boolean or an object")),
    }
}
