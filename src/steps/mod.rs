/// Step executors
///
/// Every step type is handled by a `StepExecutor` looked up by its type tag in
/// the `StepExecutorRegistry`. Built-in integrations:
/// - http: outbound HTTP request
/// - email: delivery through an HTTP email API
/// - telegram: Telegram Bot API message
/// - database: SQL against the engine's SQLite pool
/// - transform: embedded Lua script over the context
/// - wait: pause until an instant
/// Unregistered types fall back to the echo executor.

use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub mod database;
pub mod echo;
pub mod email;
pub mod http;
pub mod registry;
pub mod telegram;
pub mod transform;
pub mod wait;

pub use echo::EchoExecutor;
pub use registry::StepExecutorRegistry;

/// Result of a successful step invocation
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Output keys to merge into the execution context
    Completed(Map<String, Value>),
    /// The step is not ready; the execution pauses and this step is
    /// invoked again on resume
    Paused(PauseRequest),
}

impl StepOutcome {
    /// Completed outcome from a JSON value; objects are used as-is and
    /// anything else is wrapped under "result"
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Completed(map),
            Value::Null => Self::Completed(Map::new()),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                Self::Completed(map)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PauseRequest {
    /// When set, the execution is resumed automatically at this instant
    pub resume_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// Capability every step integration implements
///
/// `config` is already templated against `context` and stripped of the
/// engine's reserved keys. Retried invocations may repeat side effects.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError>;
}

/// Fetch a required, non-empty string field
pub(crate) fn required_str<'a>(config: &'a Map<String, Value>, key: &str) -> Result<&'a str, StepError> {
    match config.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s),
        Some(Value::String(_)) => Err(StepError::config(format!("'{}' must not be empty", key))),
        Some(_) => Err(StepError::config(format!("'{}' must be a string", key))),
        None => Err(StepError::config(format!("missing required field '{}'", key))),
    }
}

pub(crate) fn optional_str<'a>(config: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    config.get(key).and_then(Value::as_str)
}

/// Whether a rendered string still holds a `{{placeholder}}`
pub(crate) fn has_unresolved_placeholder(value: &str) -> bool {
    value
        .find("{{")
        .is_some_and(|start| value[start..].contains("}}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str_classifies_as_config_error() {
        let config = json!({ "url": "https://x", "blank": " ", "n": 1 })
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(required_str(&config, "url").unwrap(), "https://x");
        assert!(matches!(required_str(&config, "blank"), Err(StepError::Config(_))));
        assert!(matches!(required_str(&config, "n"), Err(StepError::Config(_))));
        assert!(matches!(required_str(&config, "missing"), Err(StepError::Config(_))));
    }

    #[test]
    fn test_outcome_from_value_wraps_non_objects() {
        assert_eq!(
            StepOutcome::from_value(json!(5)),
            StepOutcome::Completed(json!({ "result": 5 }).as_object().cloned().unwrap())
        );
        assert_eq!(StepOutcome::from_value(Value::Null), StepOutcome::Completed(Map::new()));
    }

    #[test]
    fn test_unresolved_placeholder_detection() {
        assert!(has_unresolved_placeholder("{{httpResponse.to}}"));
        assert!(!has_unresolved_placeholder("ops@example.com"));
        assert!(!has_unresolved_placeholder("{{ not closed"));
    }
}
