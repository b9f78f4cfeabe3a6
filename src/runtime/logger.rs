/// Best-effort execution lifecycle logger
///
/// Appends one immutable row per step event. A failed append is reported on
/// the `chainway::ops` tracing target and otherwise ignored: logging never
/// aborts or fails the step it documents.

use crate::workflow::{
    storage::ExecutionStore,
    types::{ExecutionLogEntry, LogEvent, LogMetadata},
};
use chrono::Utc;
use std::sync::Arc;

#[derive(Clone)]
pub struct ExecutionLogger {
    store: Arc<dyn ExecutionStore>,
}

impl ExecutionLogger {
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self { store }
    }

    pub async fn append(
        &self,
        execution_id: &str,
        step_id: &str,
        step_order: u32,
        event: LogEvent,
        metadata: Option<LogMetadata>,
    ) {
        let entry = ExecutionLogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            step_id: step_id.to_string(),
            step_order,
            event,
            timestamp: Utc::now(),
            metadata,
        };

        tracing::debug!(
            "📝 {} step '{}' (order {}) of execution {}",
            event.as_str(),
            step_id,
            step_order,
            execution_id
        );

        if let Err(e) = self.store.append_log(&entry).await {
            tracing::error!(
                target: "chainway::ops",
                execution_id = %execution_id,
                step_id = %step_id,
                event = event.as_str(),
                "❌ Failed to append execution log: {}",
                e
            );
        }
    }
}

impl std::fmt::Debug for ExecutionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLogger").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{memory::InMemoryStore, types::{Execution, Workflow}};
    use anyhow::Result;
    use async_trait::async_trait;

    /// Store whose log table is unavailable
    struct BrokenLogStore;

    #[async_trait]
    impl ExecutionStore for BrokenLogStore {
        async fn save_workflow(&self, _: &Workflow) -> Result<()> {
            Ok(())
        }
        async fn load_workflow(&self, _: &str) -> Result<Option<Workflow>> {
            Ok(None)
        }
        async fn create_execution(&self, _: &Execution) -> Result<()> {
            Ok(())
        }
        async fn get_execution(&self, _: &str) -> Result<Option<Execution>> {
            Ok(None)
        }
        async fn update_execution(&self, _: &Execution) -> Result<()> {
            Ok(())
        }
        async fn claim_resume(&self, _: &str) -> Result<bool> {
            Ok(false)
        }
        async fn append_log(&self, _: &ExecutionLogEntry) -> Result<()> {
            Err(anyhow::anyhow!("log table locked"))
        }
        async fn list_logs(&self, _: &str) -> Result<Vec<ExecutionLogEntry>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_append_writes_entry_with_metadata() {
        let store = Arc::new(InMemoryStore::new());
        let logger = ExecutionLogger::new(store.clone());

        logger
            .append(
                "exec-1",
                "step-a",
                0,
                LogEvent::Failed,
                Some(LogMetadata {
                    error: Some("boom".into()),
                    retry_count: Some(2),
                    resume_at: None,
                }),
            )
            .await;

        let logs = store.list_logs("exec-1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, LogEvent::Failed);
        assert_eq!(logs[0].metadata.as_ref().unwrap().error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_append_failure_is_swallowed() {
        let logger = ExecutionLogger::new(Arc::new(BrokenLogStore));
        // Must return normally
        logger.append("exec-1", "step-a", 0, LogEvent::Started, None).await;
    }
}
