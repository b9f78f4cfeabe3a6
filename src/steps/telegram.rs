/// Telegram message step
///
/// Expected config: { "chatId": "12345", "text": "Order {{orderId}} shipped", "botToken": "optional" }
/// The bot token falls back to `CHAINWAY_TELEGRAM_TOKEN`.
/// Output: { "telegram": <Bot API result object> }

use super::{optional_str, required_str, StepExecutor, StepOutcome};
use crate::{config::IntegrationsConfig, error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelegramExecutor {
    client: reqwest::Client,
    api_base: String,
    default_token: Option<String>,
}

impl TelegramExecutor {
    pub fn new(integrations: &IntegrationsConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: integrations.telegram_api_base.trim_end_matches('/').to_string(),
            default_token: integrations.telegram_bot_token.clone(),
        })
    }
}

#[async_trait]
impl StepExecutor for TelegramExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        _context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        // chatId may be numeric or a @channel username
        let chat_id = match config.get("chatId") {
            Some(Value::Number(n)) => Value::Number(n.clone()),
            Some(Value::String(_)) => Value::String(required_str(config, "chatId")?.to_string()),
            Some(_) => return Err(StepError::config("'chatId' must be a string or number")),
            None => return Err(StepError::config("missing required field 'chatId'")),
        };
        let text = required_str(config, "text")?;
        let token = optional_str(config, "botToken")
            .or(self.default_token.as_deref())
            .ok_or_else(|| StepError::config("no Telegram bot token configured"))?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        tracing::debug!("💬 Sending Telegram message to chat {}", chat_id);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await?;
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| StepError::execution(format!("invalid Telegram response ({}): {}", status, e)))?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(StepError::execution(format!(
                "Telegram API error ({}): {}",
                status, description
            )));
        }

        tracing::info!("✅ Telegram message delivered to chat {}", chat_id);

        let mut output = Map::new();
        output.insert(
            "telegram".to_string(),
            body.get("result").cloned().unwrap_or(Value::Null),
        );
        Ok(StepOutcome::Completed(output))
    }
}
