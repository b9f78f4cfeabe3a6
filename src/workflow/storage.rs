/// SQLite persistence layer for workflows, executions and execution logs
///
/// The `ExecutionStore` trait is the seam the engine and worker talk to.
/// `SqliteStore` is the production implementation; workflow definitions and
/// contexts are stored as JSON columns, timestamps as RFC 3339 text.

use crate::workflow::types::{
    Execution, ExecutionContext, ExecutionLogEntry, LogMetadata, Step, Trigger, Workflow,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    Row,
};
use std::path::Path;

/// Persistence operations required by the execution engine
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Store a workflow definition with its trigger and steps (upsert)
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()>;

    /// Load a workflow with its trigger and steps sorted by order
    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn create_execution(&self, execution: &Execution) -> Result<()>;

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>>;

    async fn update_execution(&self, execution: &Execution) -> Result<()>;

    /// Atomically move a paused execution to running
    ///
    /// Returns false when the execution is missing or not paused, so
    /// concurrent resume jobs for one execution run it at most once.
    async fn claim_resume(&self, id: &str) -> Result<bool>;

    /// Append a log row. Rows are never updated or deleted.
    async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<()>;

    /// Log trail of one execution in insertion order
    async fn list_logs(&self, execution_id: &str) -> Result<Vec<ExecutionLogEntry>>;
}

/// SQLite-based store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create new store instance with an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (or create) the database file and initialize the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, kept alive on a single connection
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self::new(pool);
        store.init_schema().await?;
        Ok(store)
    }

    /// Underlying pool, shared with the database step executor
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes. Safe to call multiple times.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflows (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                trigger JSON,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS steps (
                id TEXT NOT NULL,
                workflow_id TEXT NOT NULL,
                step_type TEXT NOT NULL,
                config JSON NOT NULL,
                step_order INTEGER NOT NULL,
                PRIMARY KEY (workflow_id, id),
                UNIQUE (workflow_id, step_order)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                status TEXT NOT NULL,
                current_step_order INTEGER,
                context JSON NOT NULL,
                error TEXT,
                paused_at TEXT,
                resume_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_logs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                execution_id TEXT NOT NULL,
                step_id TEXT NOT NULL,
                step_order INTEGER NOT NULL,
                event TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                metadata JSON
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_execution_logs_execution ON execution_logs(execution_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_workflow ON executions(workflow_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<()> {
        workflow.validate()?;
        let trigger_json = workflow
            .trigger
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflows (id, name, status, trigger, updated_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                trigger = excluded.trigger,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(workflow.status.as_str())
        .bind(trigger_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM steps WHERE workflow_id = ?")
            .bind(&workflow.id)
            .execute(&mut *tx)
            .await?;

        for step in &workflow.steps {
            sqlx::query(
                "INSERT INTO steps (id, workflow_id, step_type, config, step_order) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&step.id)
            .bind(&workflow.id)
            .bind(&step.step_type)
            .bind(serde_json::to_string(&step.config)?)
            .bind(step.order as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_workflow(&self, id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query("SELECT id, name, status, trigger FROM workflows WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let trigger: Option<String> = row.try_get("trigger")?;
        let trigger: Option<Trigger> = trigger.map(|t| serde_json::from_str(&t)).transpose()?;
        let status: String = row.try_get("status")?;

        let step_rows = sqlx::query(
            "SELECT id, step_type, config, step_order FROM steps WHERE workflow_id = ? ORDER BY step_order ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for step_row in step_rows {
            let config: String = step_row.try_get("config")?;
            let order: i64 = step_row.try_get("step_order")?;
            steps.push(Step {
                id: step_row.try_get("id")?,
                step_type: step_row.try_get("step_type")?,
                config: serde_json::from_str(&config)?,
                order: u32::try_from(order)?,
            });
        }

        Ok(Some(Workflow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            status: status.parse()?,
            trigger,
            steps,
        }))
    }

    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO executions (id, workflow_id, status, current_step_order, context, error,
                                    paused_at, resume_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(execution.status.as_str())
        .bind(execution.current_step_order.map(i64::from))
        .bind(serde_json::to_string(&execution.context)?)
        .bind(&execution.error)
        .bind(execution.paused_at.map(|t| t.to_rfc3339()))
        .bind(execution.resume_at.map(|t| t.to_rfc3339()))
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>> {
        let row = sqlx::query("SELECT * FROM executions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| execution_from_row(&r)).transpose()
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = ?, current_step_order = ?, context = ?, error = ?,
                paused_at = ?, resume_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(execution.status.as_str())
        .bind(execution.current_step_order.map(i64::from))
        .bind(serde_json::to_string(&execution.context)?)
        .bind(&execution.error)
        .bind(execution.paused_at.map(|t| t.to_rfc3339()))
        .bind(execution.resume_at.map(|t| t.to_rfc3339()))
        .bind(execution.updated_at.to_rfc3339())
        .bind(&execution.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(anyhow::anyhow!("Execution not found: {}", execution.id));
        }
        Ok(())
    }

    async fn claim_resume(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = 'running', error = NULL, paused_at = NULL, resume_at = NULL,
                updated_at = ?
            WHERE id = ? AND status = 'paused'
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_log(&self, entry: &ExecutionLogEntry) -> Result<()> {
        let metadata = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO execution_logs (id, execution_id, step_id, step_order, event, timestamp, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.execution_id)
        .bind(&entry.step_id)
        .bind(i64::from(entry.step_order))
        .bind(entry.event.as_str())
        .bind(entry.timestamp.to_rfc3339())
        .bind(metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_logs(&self, execution_id: &str) -> Result<Vec<ExecutionLogEntry>> {
        let rows = sqlx::query("SELECT * FROM execution_logs WHERE execution_id = ? ORDER BY seq ASC")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let metadata: Option<String> = row.try_get("metadata")?;
            let event: String = row.try_get("event")?;
            let step_order: i64 = row.try_get("step_order")?;
            let timestamp: String = row.try_get("timestamp")?;
            entries.push(ExecutionLogEntry {
                id: row.try_get("id")?,
                execution_id: row.try_get("execution_id")?,
                step_id: row.try_get("step_id")?,
                step_order: u32::try_from(step_order)?,
                event: event.parse()?,
                timestamp: parse_timestamp(&timestamp)?,
                metadata: metadata
                    .map(|m| serde_json::from_str::<LogMetadata>(&m))
                    .transpose()?,
            });
        }

        Ok(entries)
    }
}

fn execution_from_row(row: &SqliteRow) -> Result<Execution> {
    let status: String = row.try_get("status")?;
    let current_step_order: Option<i64> = row.try_get("current_step_order")?;
    let context: String = row.try_get("context")?;
    let paused_at: Option<String> = row.try_get("paused_at")?;
    let resume_at: Option<String> = row.try_get("resume_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Execution {
        id: row.try_get("id")?,
        workflow_id: row.try_get("workflow_id")?,
        status: status.parse()?,
        current_step_order: current_step_order.map(u32::try_from).transpose()?,
        context: serde_json::from_str::<ExecutionContext>(&context)?,
        error: row.try_get("error")?,
        paused_at: paused_at.as_deref().map(parse_timestamp).transpose()?,
        resume_at: resume_at.as_deref().map(parse_timestamp).transpose()?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
