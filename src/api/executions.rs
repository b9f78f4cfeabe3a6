/// Execution inspection and manual resume

use crate::{
    api::AppState,
    workflow::types::{Execution, ExecutionLogEntry, ExecutionStatus, Job},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Execution plus its log trail
#[derive(Debug, Serialize)]
pub struct ExecutionDetails {
    pub execution: Execution,
    pub logs: Vec<ExecutionLogEntry>,
}

pub fn create_execution_routes() -> Router<AppState> {
    Router::new()
        .route("/api/executions/{id}", get(get_execution))
        .route("/api/executions/{id}/resume", post(resume_execution))
}

/// GET /api/executions/{id}
async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<ExecutionDetails>, StatusCode> {
    let execution = load(&state, &execution_id).await?;
    let logs = state.store.list_logs(&execution_id).await.map_err(|e| {
        tracing::error!("❌ Failed to list logs for execution {}: {}", execution_id, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ExecutionDetails { execution, logs }))
}

/// POST /api/executions/{id}/resume
///
/// Only paused executions can be resumed; anything else is a conflict.
async fn resume_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let execution = load(&state, &execution_id).await?;
    if execution.status != ExecutionStatus::Paused {
        tracing::warn!(
            "⚠️ Resume requested for execution {} in status {}",
            execution_id,
            execution.status
        );
        return Err(StatusCode::CONFLICT);
    }

    state
        .queue
        .enqueue(Job::resume(&execution.workflow_id, &execution.id))
        .await
        .map_err(|e| {
            tracing::error!("❌ Failed to enqueue resume for {}: {}", execution_id, e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    tracing::info!("▶️ Resume queued for execution {}", execution_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "executionId": execution.id })),
    ))
}

async fn load(state: &AppState, execution_id: &str) -> Result<Execution, StatusCode> {
    match state.store.get_execution(execution_id).await {
        Ok(Some(execution)) => Ok(execution),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            tracing::error!("❌ Failed to load execution {}: {}", execution_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
