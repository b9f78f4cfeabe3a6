/// HTTP request step
///
/// Expected config: { "url": "https://api.example.com/users", "method": "POST",
///                    "headers": {...}, "body": {...}, "outputKey": "httpResponse" }
/// Output: { <outputKey>: <response body>, "httpStatus": 200 }
/// The body is parsed as JSON when possible, otherwise kept as text.
/// Non-2xx responses are execution errors so the retry policy applies.

use super::{optional_str, required_str, StepExecutor, StepOutcome};
use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_OUTPUT_KEY: &str = "httpResponse";

#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StepExecutor for HttpExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let url = required_str(config, "url")?;
        let method = optional_str(config, "method").unwrap_or("GET").to_uppercase();
        let output_key = optional_str(config, "outputKey").unwrap_or(DEFAULT_OUTPUT_KEY);

        tracing::debug!("🌍 HTTP Request: {} {}", method, url);

        let mut request_builder = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            _ => return Err(StepError::config(format!("unsupported HTTP method: {}", method))),
        };

        if let Some(headers) = config.get("headers") {
            let headers = headers
                .as_object()
                .ok_or_else(|| StepError::config("'headers' must be an object"))?;
            for (key, value) in headers {
                match value {
                    Value::String(s) => request_builder = request_builder.header(key, s),
                    other => request_builder = request_builder.header(key, other.to_string()),
                }
            }
        }

        // Request body: structured values go out as JSON, strings as plain text
        match config.get("body") {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) => {
                request_builder = request_builder
                    .header("Content-Type", "text/plain")
                    .body(text.clone());
            }
            Some(body) => request_builder = request_builder.json(body),
        }

        let response = request_builder.send().await?;
        let status = response.status();
        tracing::debug!("📡 Response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| StepError::execution(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            return Err(StepError::execution(format!(
                "{} {} returned {}: {}",
                method,
                url,
                status,
                truncate(&response_text, 200)
            )));
        }

        let body = serde_json::from_str::<Value>(&response_text)
            .unwrap_or(Value::String(response_text));

        tracing::info!("✅ HTTP request completed: {} {} (status: {})", method, url, status);

        let mut output = Map::new();
        output.insert(output_key.to_string(), body);
        output.insert("httpStatus".to_string(), Value::from(status.as_u16()));
        Ok(StepOutcome::Completed(output))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
