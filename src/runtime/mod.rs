/// Runtime execution engine
///
/// This module drives workflow executions. It handles:
/// - Sequential step orchestration with retry and pause (`engine`)
/// - `{{placeholder}}` templating of step configs (`template`)
/// - Best-effort lifecycle logging (`logger`)
/// - Failure/pause notifications (`notification`)
/// - The job queue and its worker (`worker`)

// Step loop and execution state machine
pub mod engine;

// Best-effort execution log writer
pub mod logger;

// Notification payloads and delivery
pub mod notification;

// Retry policy evaluation and backoff
pub mod retry;

// Placeholder resolution against the execution context
pub mod template;

// In-process job queue and consumer
pub mod worker;

// Re-export main types
pub use engine::{ExecutionResult, WorkflowExecutor};
pub use logger::ExecutionLogger;
pub use notification::{LogNotifier, NotificationPayload, NotificationStatus, Notifier, WebhookNotifier};
pub use retry::RetryPolicy;
pub use worker::{JobQueue, Worker};
