/// SQL step against the engine's SQLite pool
///
/// Expected config: { "query": "SELECT * FROM orders WHERE id = ?", "params": ["{{orderId}}"],
///                    "outputKey": "dbResult" }
/// Row-returning statements (SELECT, WITH, ... RETURNING) produce
/// { <outputKey>: { "rows": [...], "rowsAffected": n } }; other statements
/// report only `rowsAffected`. Parameters are always bound, never interpolated.

use super::{optional_str, required_str, StepExecutor, StepOutcome};
use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::{
    sqlite::{SqliteArguments, SqlitePool, SqliteRow},
    Column, Row, Sqlite,
};

pub const DEFAULT_OUTPUT_KEY: &str = "dbResult";

#[derive(Debug, Clone)]
pub struct DatabaseExecutor {
    pool: SqlitePool,
}

impl DatabaseExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepExecutor for DatabaseExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let query = required_str(config, "query")?;
        let output_key = optional_str(config, "outputKey").unwrap_or(DEFAULT_OUTPUT_KEY);
        let params = match config.get("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.clone(),
            Some(_) => return Err(StepError::config("'params' must be an array")),
        };

        tracing::debug!("📋 SQL Query: {}", query);
        tracing::debug!("🔗 Binding {} parameters", params.len());

        let result = if returns_rows(query) {
            let rows = bind_all(sqlx::query(query), &params)
                .fetch_all(&self.pool)
                .await?;
            let records: Vec<Value> = rows.iter().map(row_to_json).collect();
            tracing::info!("✅ Query returned {} rows", records.len());
            json!({ "rowsAffected": records.len(), "rows": records })
        } else {
            let done = bind_all(sqlx::query(query), &params)
                .execute(&self.pool)
                .await?;
            tracing::info!("✅ Statement affected {} rows", done.rows_affected());
            json!({ "rowsAffected": done.rows_affected() })
        };

        let mut output = Map::new();
        output.insert(output_key.to_string(), result);
        Ok(StepOutcome::Completed(output))
    }
}

fn returns_rows(query: &str) -> bool {
    let normalized = query.trim_start().to_ascii_uppercase();
    normalized.starts_with("SELECT")
        || normalized.starts_with("WITH")
        || normalized.starts_with("PRAGMA")
        || normalized.contains(" RETURNING ")
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind parameters based on JSON value type
fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [Value]) -> SqliteQuery<'q> {
    for value in params {
        query = match value {
            Value::String(s) => query.bind(s.as_str()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    query.bind(n.to_string())
                }
            }
            Value::Bool(b) => query.bind(*b),
            Value::Null => query.bind(None::<String>),
            other => query.bind(other.to_string()),
        };
    }
    query
}

/// Decode each column by trying SQLite's storage classes in turn
fn row_to_json(row: &SqliteRow) -> Value {
    let mut record = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(i) {
            json!(v)
        } else if let Ok(Some(v)) = row.try_get::<Option<String>, _>(i) {
            Value::String(v)
        } else {
            Value::Null
        };
        record.insert(column.name().to_string(), value);
    }
    Value::Object(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::SqliteStore;

    async fn executor() -> DatabaseExecutor {
        let store = SqliteStore::open_in_memory().await.unwrap();
        let pool = store.pool().clone();
        sqlx::query("CREATE TABLE orders (id INTEGER PRIMARY KEY, customer TEXT, total REAL)")
            .execute(&pool)
            .await
            .unwrap();
        DatabaseExecutor::new(pool)
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_then_select_with_bound_params() {
        let executor = executor().await;

        let outcome = executor
            .execute(
                &config(json!({
                    "query": "INSERT INTO orders (id, customer, total) VALUES (?, ?, ?)",
                    "params": [1, "ada", 9.5]
                })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed(config(json!({ "dbResult": { "rowsAffected": 1 } })))
        );

        let outcome = executor
            .execute(
                &config(json!({
                    "query": "SELECT id, customer, total FROM orders WHERE customer = ?",
                    "params": ["ada"],
                    "outputKey": "orders"
                })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Completed(config(json!({
                "orders": {
                    "rowsAffected": 1,
                    "rows": [{ "id": 1, "customer": "ada", "total": 9.5 }]
                }
            })))
        );
    }

    #[tokio::test]
    async fn test_sql_error_is_execution_error() {
        let err = executor()
            .await
            .execute(&config(json!({ "query": "SELECT * FROM missing" })), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_params_must_be_array() {
        let err = executor()
            .await
            .execute(
                &config(json!({ "query": "SELECT 1", "params": "nope" })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config(_)));
    }

    #[test]
    fn test_returns_rows_detection() {
        assert!(returns_rows("  select 1"));
        assert!(returns_rows("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(returns_rows("INSERT INTO t (a) VALUES (1) RETURNING id"));
        assert!(!returns_rows("DELETE FROM t"));
    }
}
