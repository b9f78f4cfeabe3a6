/// Core workflow type definitions
///
/// Defines workflows, triggers, steps, executions and their log entries.
/// These types are serialized to JSON (camelCase) both for persistence and for
/// the job/notification wire formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A workflow definition: an optional trigger plus a linear list of steps
///
/// Steps run strictly by ascending `order`. Order values are unique,
/// non-negative integers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique workflow identifier (e.g., "wf-onboarding")
    pub id: String,
    /// Human-readable workflow name
    pub name: String,
    /// Lifecycle status
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Event source that starts this workflow
    #[serde(default)]
    pub trigger: Option<Trigger>,
    /// Steps in this workflow (any order on input; sorted by the store)
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Steps sorted by ascending order
    pub fn ordered_steps(&self) -> Vec<Step> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| s.order);
        steps
    }

    /// Check that step orders are unique
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.order) {
                return Err(anyhow::anyhow!(
                    "Workflow '{}' has duplicate step order {}",
                    self.id,
                    step.order
                ));
            }
        }
        Ok(())
    }
}

/// Workflow lifecycle status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Published,
    Active,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Active => "active",
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "active" => Ok(Self::Active),
            other => Err(anyhow::anyhow!("Unknown workflow status: {}", other)),
        }
    }
}

/// Event source for a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Opaque trigger configuration (e.g., { "path": "/signup" })
    #[serde(default)]
    pub config: Value,
}

/// Available trigger types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Email,
    Cron,
    Webhook,
    Manual,
}

/// A single unit of work
///
/// The `step_type` tag selects the executor from the registry. The config may
/// hold `{{placeholders}}` and the reserved `retry` / `pause` keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default = "empty_object")]
    pub config: Value,
    pub order: u32,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Execution status state machine: running -> completed | failed | paused,
/// paused -> running on resume
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            other => Err(anyhow::anyhow!("Unknown execution status: {}", other)),
        }
    }
}

/// One run of a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    /// Null before the first step and after successful completion
    pub current_step_order: Option<u32>,
    pub context: ExecutionContext,
    pub error: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub resume_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Create a fresh running execution seeded with the given context
    pub fn new(workflow_id: impl Into<String>, context: ExecutionContext) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            current_step_order: None,
            context,
            error: None,
            paused_at: None,
            resume_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Accumulated key/value data for one execution
///
/// Seeded from the trigger payload and extended by a shallow, left-biased merge
/// of each successful step output. Keys are never removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ExecutionContext(Map<String, Value>);

impl ExecutionContext {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Seed a context from a trigger payload
    ///
    /// Objects become the top-level keys, null becomes an empty context, and
    /// any other value is kept under "payload".
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                Self(map)
            }
        }
    }

    /// Merge a step output into the context (output keys win)
    pub fn merge(&mut self, output: Map<String, Value>) {
        for (key, value) in output {
            self.0.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Walk a dotted path through nested objects and arrays
    pub fn lookup_path<'a, I>(&self, mut path: I) -> Option<&Value>
    where
        I: Iterator<Item = &'a str>,
    {
        let first = path.next()?;
        let mut current = self.0.get(first)?;
        for segment in path {
            current = match current {
                Value::Object(obj) => obj.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Top-level keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Lifecycle events recorded per step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogEvent {
    Started,
    Completed,
    Failed,
    Paused,
    Retried,
}

impl LogEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Retried => "retried",
        }
    }
}

impl FromStr for LogEvent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "paused" => Ok(Self::Paused),
            "retried" => Ok(Self::Retried),
            other => Err(anyhow::anyhow!("Unknown log event: {}", other)),
        }
    }
}

/// Optional metadata attached to a log entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_at: Option<DateTime<Utc>>,
}

/// Append-only record of a step lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLogEntry {
    pub id: String,
    pub execution_id: String,
    pub step_id: String,
    pub step_order: u32,
    pub event: LogEvent,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<LogMetadata>,
}

/// Job consumed from the queue
///
/// Presence of `execution_id` selects resume mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub workflow_id: String,
    #[serde(default)]
    pub trigger_payload: Option<Value>,
    #[serde(default)]
    pub execution_id: Option<String>,
}

impl Job {
    pub fn fresh(workflow_id: impl Into<String>, payload: Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            trigger_payload: Some(payload),
            execution_id: None,
        }
    }

    pub fn resume(workflow_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            trigger_payload: None,
            execution_id: Some(execution_id.into()),
        }
    }
}
