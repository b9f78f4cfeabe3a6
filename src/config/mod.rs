/// Configuration management for the Chainway engine
///
/// Handles server, storage, engine policy and integration settings. Every
/// value can be overridden through a `CHAINWAY_*` environment variable.

use crate::runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Execution engine policy
    pub engine: EngineConfig,
    /// Credentials and endpoints for built-in step integrations
    pub integrations: IntegrationsConfig,
}

/// HTTP intake server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding `chainway.db` (default: "data")
    pub data_dir: String,
    /// Optional directory of workflow JSON files imported at startup
    pub workflows_dir: Option<String>,
}

impl DatabaseConfig {
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("chainway.db")
    }
}

/// Execution engine policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default retries per step when the step has no override
    pub max_retries: u32,
    /// Default delay in milliseconds before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound on concurrently running executions in the worker
    pub max_concurrent_executions: usize,
    /// Fail unregistered step types instead of echoing them
    pub strict_step_types: bool,
    /// Webhook receiving failure/pause notifications
    pub notify_url: Option<String>,
}

impl EngineConfig {
    pub fn default_retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_delay_ms)
    }
}

/// Built-in step integration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationsConfig {
    /// Timeout applied to outbound HTTP calls (http, email, telegram, notify)
    pub http_timeout_secs: u64,
    pub telegram_bot_token: Option<String>,
    pub telegram_api_base: String,
    /// HTTP email API endpoint (JSON `{from, to, subject, text}`)
    pub email_api_url: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
}

impl IntegrationsConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for k8s/container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: env_or("CHAINWAY_HOST", "0.0.0.0"),
                port: env_parse("CHAINWAY_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: env_or("CHAINWAY_DATA_DIR", "data"),
                workflows_dir: env_opt("CHAINWAY_WORKFLOWS_DIR"),
            },
            engine: EngineConfig {
                max_retries: env_parse("CHAINWAY_MAX_RETRIES", 3),
                initial_delay_ms: env_parse("CHAINWAY_INITIAL_DELAY_MS", 1000),
                max_concurrent_executions: env_parse("CHAINWAY_MAX_CONCURRENT_EXECUTIONS", 16),
                strict_step_types: env_parse("CHAINWAY_STRICT_STEP_TYPES", false),
                notify_url: env_opt("CHAINWAY_NOTIFY_URL"),
            },
            integrations: IntegrationsConfig {
                http_timeout_secs: env_parse("CHAINWAY_HTTP_TIMEOUT_SECS", 30),
                telegram_bot_token: env_opt("CHAINWAY_TELEGRAM_TOKEN"),
                telegram_api_base: env_or("CHAINWAY_TELEGRAM_API_BASE", "https://api.telegram.org"),
                email_api_url: env_opt("CHAINWAY_EMAIL_API_URL"),
                email_api_key: env_opt("CHAINWAY_EMAIL_API_KEY"),
                email_from: env_or("CHAINWAY_EMAIL_FROM", "chainway@localhost"),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Invalid value for {}: '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_on_garbage() {
        std::env::set_var("CHAINWAY_TEST_PARSE_GARBAGE", "not-a-number");
        assert_eq!(env_parse("CHAINWAY_TEST_PARSE_GARBAGE", 7u32), 7);
        std::env::set_var("CHAINWAY_TEST_PARSE_OK", " 12 ");
        assert_eq!(env_parse("CHAINWAY_TEST_PARSE_OK", 7u32), 12);
    }

    #[test]
    fn test_env_opt_ignores_blank_values() {
        std::env::set_var("CHAINWAY_TEST_BLANK", "  ");
        assert_eq!(env_opt("CHAINWAY_TEST_BLANK"), None);
    }

    #[test]
    fn test_default_retry_uses_engine_settings() {
        let engine = EngineConfig {
            max_retries: 5,
            initial_delay_ms: 250,
            max_concurrent_executions: 1,
            strict_step_types: false,
            notify_url: None,
        };
        assert_eq!(engine.default_retry(), RetryPolicy::new(5, 250));
    }

    #[test]
    fn test_database_path_is_inside_data_dir() {
        let db = DatabaseConfig {
            data_dir: "var/chainway".into(),
            workflows_dir: None,
        };
        assert_eq!(db.database_path(), PathBuf::from("var/chainway/chainway.db"));
    }
}
