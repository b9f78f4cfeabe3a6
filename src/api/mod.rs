/// HTTP API layer
///
/// Intake endpoints only. Triggering callers get `202 Accepted` as soon as the
/// job is queued; execution state is read back through `/api/executions`.
/// It handles:
/// - Webhook and manual triggers (`webhooks`)
/// - Execution inspection and manual resume (`executions`)

use crate::{runtime::worker::JobQueue, workflow::storage::ExecutionStore};
use std::sync::Arc;

// Webhook and manual run intake
pub mod webhooks;

// Execution inspection and resume
pub mod executions;

pub use executions::create_execution_routes;
pub use webhooks::create_webhook_routes;

/// Shared state for every intake route
#[derive(Clone)]
pub struct AppState {
    /// Queue consumed by the worker
    pub queue: JobQueue,
    /// Read access to workflows, executions and logs
    pub store: Arc<dyn ExecutionStore>,
}
