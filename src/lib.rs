/// Chainway: linear workflow execution engine
///
/// Runs ordered steps for webhook, scheduled and manual automations with
/// per-step retry, pause-and-resume, append-only execution logs and
/// failure notifications.

// Core configuration and setup
pub mod config;

// Step error taxonomy
pub mod error;

// Workflow definitions, execution records and persistence
pub mod workflow;

// Step executor contract, registry and built-in integrations
pub mod steps;

// Execution engine, templating, retry, logging, notification, worker
pub mod runtime;

// HTTP intake - webhook/manual triggers and execution inspection
pub mod api;

// Server setup and initialization
pub mod server;

// Re-export commonly used types for external consumers
pub use error::StepError;
pub use runtime::{ExecutionResult, RetryPolicy, WorkflowExecutor};
pub use server::start_server;
pub use steps::{StepExecutor, StepExecutorRegistry, StepOutcome};
pub use workflow::{Execution, ExecutionContext, Job, Step, Workflow};
