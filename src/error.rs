/// Step error taxonomy
///
/// Every executor failure is classified as either a configuration problem
/// (never retried) or an execution problem (subject to the retry policy).

use thiserror::Error;

/// Error returned by a step executor
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepError {
    /// Missing or invalid configuration field. Fails the step immediately.
    #[error("step config error: {0}")]
    Config(String),

    /// Transient or integration failure. Retried per policy.
    #[error("step execution error: {0}")]
    Execution(String),
}

impl StepError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Whether the orchestrator may retry after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// The bare message without the classification prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Config(m) | Self::Execution(m) => m,
        }
    }
}

impl From<reqwest::Error> for StepError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Config(format!("invalid request: {}", err))
        } else {
            Self::Execution(format!("request failed: {}", err))
        }
    }
}

impl From<sqlx::Error> for StepError {
    fn from(err: sqlx::Error) -> Self {
        Self::Execution(format!("database error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_execution_errors_are_retryable() {
        assert!(StepError::execution("timeout").is_retryable());
        assert!(!StepError::config("missing 'url'").is_retryable());
    }

    #[test]
    fn test_display_and_message() {
        let err = StepError::config("missing 'to'");
        assert_eq!(err.to_string(), "step config error: missing 'to'");
        assert_eq!(err.message(), "missing 'to'");
    }
}
