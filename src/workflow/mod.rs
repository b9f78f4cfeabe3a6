/// Workflow Management Layer
///
/// Type definitions (Workflow, Step, Execution, log entries) and the
/// persistence seam used by the engine:
/// - `ExecutionStore` trait
/// - SQLite implementation with sqlx
/// - In-memory implementation for tests and embedding

// Core workflow type definitions
pub mod types;

// Persistence trait and SQLite store
pub mod storage;

// In-memory store
pub mod memory;

// Re-export commonly used types
pub use memory::InMemoryStore;
pub use storage::{ExecutionStore, SqliteStore};
pub use types::{
    Execution, ExecutionContext, ExecutionLogEntry, ExecutionStatus, Job, LogEvent, LogMetadata,
    Step, Trigger, TriggerType, Workflow, WorkflowStatus,
};
