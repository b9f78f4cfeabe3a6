/// Webhook and manual trigger endpoints
///
/// Both routes validate that the workflow exists, enqueue a fresh job with the
/// request body as trigger payload and answer `202 Accepted` without waiting
/// for the execution.

use crate::{
    api::AppState,
    workflow::types::{Job, TriggerType, Workflow},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde_json::{json, Value};

pub fn create_webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/{workflow_id}", post(receive_webhook))
        .route("/api/workflows/{id}/run", post(run_workflow))
}

/// POST /webhook/{workflow_id}
/// Body: JSON payload that seeds the execution context
///
/// Only workflows with a webhook trigger accept calls here.
async fn receive_webhook(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    tracing::info!("📥 Webhook request received: {}", workflow_id);

    let payload = parse_payload(&workflow_id, &body)?;
    let workflow = find_workflow(&state, &workflow_id).await?;

    match workflow.trigger.as_ref().map(|t| t.trigger_type) {
        Some(TriggerType::Webhook) => {}
        other => {
            tracing::warn!(
                "❌ Webhook called for workflow {} whose trigger is {:?}",
                workflow_id,
                other
            );
            return Err(StatusCode::NOT_FOUND);
        }
    }

    enqueue(&state, Job::fresh(&workflow.id, payload)).await
}

/// POST /api/workflows/{id}/run
/// Body: optional JSON payload; manual runs ignore the workflow's trigger type
async fn run_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    tracing::info!("▶️ Manual run requested: {}", workflow_id);

    let payload = parse_payload(&workflow_id, &body)?;
    let workflow = find_workflow(&state, &workflow_id).await?;
    enqueue(&state, Job::fresh(&workflow.id, payload)).await
}

/// Parse JSON body manually to handle errors gracefully; empty means no payload
fn parse_payload(workflow_id: &str, body: &str) -> Result<Value, StatusCode> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    tracing::debug!("📄 Request body: {}", body);
    serde_json::from_str(body).map_err(|e| {
        tracing::warn!("❌ Invalid JSON payload for workflow {}: {}", workflow_id, e);
        StatusCode::BAD_REQUEST
    })
}

async fn find_workflow(state: &AppState, workflow_id: &str) -> Result<Workflow, StatusCode> {
    match state.store.load_workflow(workflow_id).await {
        Ok(Some(workflow)) => Ok(workflow),
        Ok(None) => {
            tracing::warn!("❌ Trigger for unknown workflow: {}", workflow_id);
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("❌ Failed to load workflow {}: {}", workflow_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn enqueue(state: &AppState, job: Job) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflow_id = job.workflow_id.clone();
    state.queue.enqueue(job).await.map_err(|e| {
        tracing::error!("❌ Failed to enqueue job for {}: {}", workflow_id, e);
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "workflowId": workflow_id })),
    ))
}
