/// Wait step
///
/// Expected config: { "until": "2026-01-01T09:00:00Z" }
/// Before `until` the step pauses the execution with `resumeAt = until`; the
/// worker resumes it at that instant and the step then completes with
/// { "waitedUntil": "<until>" }.

use super::{required_str, PauseRequest, StepExecutor, StepOutcome};
use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Default, Clone)]
pub struct WaitExecutor;

#[async_trait]
impl StepExecutor for WaitExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let raw = required_str(config, "until")?;
        let until = DateTime::parse_from_rfc3339(raw)
            .map_err(|e| StepError::config(format!("'until' is not an RFC 3339 timestamp: {}", e)))?
            .with_timezone(&Utc);

        if Utc::now() < until {
            tracing::info!("⏸️ Waiting until {}", until.to_rfc3339());
            return Ok(StepOutcome::Paused(PauseRequest {
                resume_at: Some(until),
                reason: Some(format!("waiting until {}", until.to_rfc3339())),
            }));
        }

        let mut output = Map::new();
        output.insert("waitedUntil".to_string(), Value::String(until.to_rfc3339()));
        Ok(StepOutcome::Completed(output))
    }
}
