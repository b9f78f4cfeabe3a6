/// Email delivery step
///
/// Sends through an HTTP email API configured by `CHAINWAY_EMAIL_API_URL`.
/// Expected config: { "to": "ops@example.com", "subject": "...", "body": "...", "from": "optional" }
/// Output: { "email": { "to", "subject", "status": "sent", "id"? } }

use super::{has_unresolved_placeholder, optional_str, required_str, StepExecutor, StepOutcome};
use crate::{config::IntegrationsConfig, error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EmailExecutor {
    client: reqwest::Client,
    api_url: Option<String>,
    api_key: Option<String>,
    default_from: String,
}

impl EmailExecutor {
    pub fn new(integrations: &IntegrationsConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: integrations.email_api_url.clone(),
            api_key: integrations.email_api_key.clone(),
            default_from: integrations.email_from.clone(),
        })
    }
}

#[async_trait]
impl StepExecutor for EmailExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let to = required_str(config, "to")?;
        let subject = required_str(config, "subject")?;
        let body = required_str(config, "body")?;
        let from = optional_str(config, "from").unwrap_or(&self.default_from);

        // A recipient the template engine could not fill must never be sent to
        if has_unresolved_placeholder(to) {
            return Err(StepError::config(format!("recipient is unresolved: {}", to)));
        }

        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(|| StepError::config("email API is not configured (CHAINWAY_EMAIL_API_URL)"))?;

        tracing::debug!("📧 Sending email to {} ({})", to, subject);

        let mut request = self.client.post(api_url).json(&json!({
            "from": from,
            "to": to,
            "subject": subject,
            "text": body,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StepError::execution(format!(
                "email API returned {}: {}",
                status, detail
            )));
        }

        // Provider message id is optional; ignore bodies that are not JSON
        let message_id = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|v| v.get("id").cloned());

        tracing::info!("✅ Email sent to {}", to);

        let mut receipt = Map::new();
        receipt.insert("to".to_string(), Value::String(to.to_string()));
        receipt.insert("subject".to_string(), Value::String(subject.to_string()));
        receipt.insert("status".to_string(), Value::String("sent".to_string()));
        if let Some(id) = message_id {
            receipt.insert("id".to_string(), id);
        }

        let mut output = Map::new();
        output.insert("email".to_string(), Value::Object(receipt));
        Ok(StepOutcome::Completed(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn integrations(api_url: Option<String>) -> IntegrationsConfig {
        IntegrationsConfig {
            http_timeout_secs: 5,
            telegram_bot_token: None,
            telegram_api_base: "http://unused".into(),
            email_api_url: api_url,
            email_api_key: Some("key-123".into()),
            email_from: "noreply@example.com".into(),
        }
    }

    fn config(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_sends_message_through_api() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header("authorization", "Bearer key-123"))
            .and(body_partial_json(json!({
                "from": "noreply@example.com",
                "to": "ada@example.com",
                "subject": "Hi"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg-1" })))
            .expect(1)
            .mount(&server)
            .await;

        let executor =
            EmailExecutor::new(&integrations(Some(format!("{}/send", server.uri()))), Duration::from_secs(5))
                .unwrap();
        let outcome = executor
            .execute(
                &config(json!({ "to": "ada@example.com", "subject": "Hi", "body": "Welcome" })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Completed(config(json!({
                "email": { "to": "ada@example.com", "subject": "Hi", "status": "sent", "id": "msg-1" }
            })))
        );
    }

    #[tokio::test]
    async fn test_unresolved_recipient_is_config_error() {
        let executor = EmailExecutor::new(&integrations(Some("http://unused".into())), Duration::from_secs(5)).unwrap();
        let err = executor
            .execute(
                &config(json!({ "to": "{{httpResponse.to}}", "subject": "Hi", "body": "x" })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_api_is_config_error() {
        let executor = EmailExecutor::new(&integrations(None), Duration::from_secs(5)).unwrap();
        let err = executor
            .execute(
                &config(json!({ "to": "a@b.c", "subject": "Hi", "body": "x" })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let executor = EmailExecutor::new(&integrations(Some(server.uri())), Duration::from_secs(5)).unwrap();
        let err = executor
            .execute(
                &config(json!({ "to": "a@b.c", "subject": "Hi", "body": "x" })),
                &ExecutionContext::new(),
            )
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.message().contains("503"));
    }
}
