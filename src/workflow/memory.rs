/// In-memory implementation of `ExecutionStore`
///
/// Same semantics as the SQLite store without any I/O. Used by tests and by
/// embedders that do not need persistence across restarts.

use crate::workflow::{
    storage::ExecutionStore,
    types::{Execution, ExecutionLogEntry, ExecutionStatus, Workflow},
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    workflows: RwLock<HashMap<String, Workflow>>,
    executions: RwLock<HashMap<String, Execution>>,
    logs: RwLock<Vec<ExecutionLogEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored executions
    pub async fn execution_count(&self) -> usize {
        self.executions.read().await.len()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        workflow.validate()?;
        let mut stored = workflow.clone();
        stored.steps = workflow.ordered_steps();
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), stored);
        Ok(())
    }

    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        Ok(self.workflows.read().await.get(id).cloned())
    }

    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        let mut executions = self.executions.write().await;
        if executions.contains_key(&execution.id) {
            return Err(anyhow::anyhow!("Execution already exists: {}", execution.id));
        }
        executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        Ok(self.executions.read().await.get(id).cloned())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(&execution.id) {
            Some(existing) => {
                *existing = execution.clone();
                Ok(())
            }
            None => Err(anyhow::anyhow!("Execution not found: {}", execution.id)),
        }
    }

    async fn claim_resume(&self, id: &str) -> Result<bool> {
        let mut executions = self.executions.write().await;
        match executions.get_mut(id) {
            Some(execution) if execution.status == ExecutionStatus::Paused => {
                execution.status = ExecutionStatus::Running;
                execution.error = None;
                execution.paused_at = None;
                execution.resume_at = None;
                execution.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<()> {
        self.logs.write().await.push(entry.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: &str) -> Result<Vec<ExecutionLogEntry>> {
        Ok(self
            .logs
            .read()
            .await
            .iter()
            .filter(|entry| entry.execution_id == execution_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::ExecutionContext;

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let store = InMemoryStore::new();
        let execution = Execution::new("wf", ExecutionContext::new());
        store.create_execution(&execution).await.unwrap();
        assert!(store.create_execution(&execution).await.is_err());
        assert_eq!(store.execution_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let store = InMemoryStore::new();
        let mut execution = Execution::new("wf", ExecutionContext::new());
        store.create_execution(&execution).await.unwrap();

        execution.status = ExecutionStatus::Completed;
        store.update_execution(&execution).await.unwrap();

        let loaded = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_claim_resume_only_from_paused() {
        let store = InMemoryStore::new();
        let mut execution = Execution::new("wf", ExecutionContext::new());
        execution.status = ExecutionStatus::Paused;
        execution.paused_at = Some(Utc::now());
        store.create_execution(&execution).await.unwrap();

        assert!(store.claim_resume(&execution.id).await.unwrap());
        assert!(!store.claim_resume(&execution.id).await.unwrap());

        let loaded = store.get_execution(&execution.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert!(loaded.paused_at.is_none());
    }
}
