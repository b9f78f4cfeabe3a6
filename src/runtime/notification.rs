/// Failure and pause notifications
///
/// `build` is a pure function over execution state. Delivery goes through the
/// `Notifier` trait; the engine treats delivery as best effort.

use crate::workflow::types::Step;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Failed,
    Paused,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

/// The step a notification is attributed to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailedStep {
    pub order: u32,
    #[serde(rename = "type")]
    pub step_type: String,
}

/// Summary sent on `failed` and `paused` transitions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub workflow_id: String,
    pub execution_id: String,
    pub failed_step: Option<FailedStep>,
    pub error: Option<String>,
    pub status: NotificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
}

/// Assemble a notification payload
///
/// `failed_step` is the step whose order equals `current_step_order`, or
/// `None` when no order is given or no step matches.
#[allow(clippy::too_many_arguments)]
pub fn build(
    workflow_id: &str,
    execution_id: &str,
    status: NotificationStatus,
    current_step_order: Option<u32>,
    error: Option<String>,
    paused_at: Option<DateTime<Utc>>,
    resume_at: Option<DateTime<Utc>>,
    steps: &[Step],
) -> NotificationPayload {
    let failed_step = current_step_order.and_then(|order| {
        steps.iter().find(|s| s.order == order).map(|s| FailedStep {
            order: s.order,
            step_type: s.step_type.clone(),
        })
    });

    let (paused_at, resume_at) = match status {
        NotificationStatus::Paused => (paused_at, resume_at),
        NotificationStatus::Failed => (None, None),
    };

    NotificationPayload {
        workflow_id: workflow_id.to_string(),
        execution_id: execution_id.to_string(),
        failed_step,
        error,
        status,
        paused_at,
        resume_at,
    }
}

/// Outbound delivery collaborator
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, payload: &NotificationPayload) -> Result<()>;
}

/// Writes notifications to the tracing output
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, payload: &NotificationPayload) -> Result<()> {
        tracing::warn!(
            "📣 Execution {} of workflow {} is {}: {}",
            payload.execution_id,
            payload.workflow_id,
            payload.status.as_str(),
            payload.error.as_deref().unwrap_or("no error message")
        );
        tracing::debug!("📣 Notification payload: {}", serde_json::to_string(payload)?);
        Ok(())
    }
}

/// POSTs the payload JSON to a configured URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn dispatch(&self, payload: &NotificationPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "Notification endpoint {} returned {}",
                self.url,
                status
            ));
        }
        tracing::debug!("📣 Notification delivered to {} ({})", self.url, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn steps() -> Vec<Step> {
        vec![
            Step {
                id: "a".into(),
                step_type: "http".into(),
                config: json!({}),
                order: 0,
            },
            Step {
                id: "b".into(),
                step_type: "email".into(),
                config: json!({}),
                order: 1,
            },
        ]
    }

    #[test]
    fn test_build_attributes_failed_step() {
        let payload = build(
            "wf-1",
            "exec-1",
            NotificationStatus::Failed,
            Some(1),
            Some("smtp down".into()),
            None,
            None,
            &steps(),
        );

        assert_eq!(
            payload.failed_step,
            Some(FailedStep {
                order: 1,
                step_type: "email".into()
            })
        );
        assert_eq!(payload.error.as_deref(), Some("smtp down"));
    }

    #[test]
    fn test_build_without_matching_step_is_unattributed() {
        let missing = build("wf", "e", NotificationStatus::Failed, Some(9), None, None, None, &steps());
        assert!(missing.failed_step.is_none());

        let none = build("wf", "e", NotificationStatus::Failed, None, None, None, None, &steps());
        assert!(none.failed_step.is_none());
    }

    #[test]
    fn test_paused_payload_serializes_timestamps() {
        let paused_at = Utc::now();
        let payload = build(
            "wf",
            "e",
            NotificationStatus::Paused,
            Some(0),
            None,
            Some(paused_at),
            None,
            &steps(),
        );

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["status"], json!("paused"));
        assert_eq!(value["failedStep"], json!({ "order": 0, "type": "http" }));
        assert!(value.get("pausedAt").is_some());
        assert!(value.get("resumeAt").is_none());
    }

    #[test]
    fn test_failed_payload_drops_pause_timestamps() {
        let payload = build(
            "wf",
            "e",
            NotificationStatus::Failed,
            None,
            Some("x".into()),
            Some(Utc::now()),
            Some(Utc::now()),
            &[],
        );
        assert!(payload.paused_at.is_none());
        assert!(payload.resume_at.is_none());
    }

    #[tokio::test]
    async fn test_webhook_notifier_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(json!({ "executionId": "exec-1", "status": "failed" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/notify", server.uri()), Duration::from_secs(5)).unwrap();
        let payload = build("wf", "exec-1", NotificationStatus::Failed, None, None, None, None, &[]);
        notifier.dispatch(&payload).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_notifier_reports_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        let payload = build("wf", "e", NotificationStatus::Paused, None, None, None, None, &[]);
        assert!(notifier.dispatch(&payload).await.is_err());
    }
}
