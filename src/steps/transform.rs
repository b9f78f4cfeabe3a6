/// Lua transform step
///
/// Expected config: { "script": "return { total = context.order.qty * context.order.price }" }
/// The accumulated context is exposed as the global `context`. A returned
/// table becomes the step output; any other value is stored under "result".
///
/// Scripts run in a fresh sandboxed state per invocation: `os`, `io`,
/// `debug` and `package` are removed and memory is capped. `date(fmt)`,
/// `time()` and `now()` replace the removed clock functions.

use super::{required_str, StepExecutor, StepOutcome};
use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use mlua::{Lua, LuaSerdeExt};
use serde_json::{Map, Value};

const MEMORY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Default, Clone)]
pub struct TransformExecutor;

#[async_trait]
impl StepExecutor for TransformExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let script = required_str(config, "script")?;
        tracing::debug!("🌙 Running Lua transform ({} bytes)", script.len());

        // `Lua` is not Send; keep it inside a sync call so the future stays Send
        let value = run_script(script, context)?;
        let outcome = match value {
            Value::Array(items) if items.is_empty() => StepOutcome::Completed(Map::new()),
            other => StepOutcome::from_value(other),
        };

        tracing::debug!("✅ Lua transform completed");
        Ok(outcome)
    }
}

fn run_script(script: &str, context: &ExecutionContext) -> Result<Value, StepError> {
    let lua = sandbox().map_err(|e| StepError::execution(format!("failed to prepare Lua: {}", e)))?;

    let context_value = lua
        .to_value(context.as_map())
        .map_err(|e| StepError::execution(format!("failed to expose context to Lua: {}", e)))?;
    lua.globals()
        .set("context", context_value)
        .map_err(|e| StepError::execution(format!("failed to expose context to Lua: {}", e)))?;

    let result = lua.load(script).eval::<mlua::Value>().map_err(|e| match e {
        mlua::Error::SyntaxError { message, .. } => {
            StepError::config(format!("Lua syntax error: {}", message))
        }
        other => StepError::execution(format!("Lua execution failed: {}", other)),
    })?;

    lua.from_value::<Value>(result)
        .map_err(|e| StepError::execution(format!("Lua result is not JSON-compatible: {}", e)))
}

fn sandbox() -> mlua::Result<Lua> {
    let lua = Lua::new();
    lua.set_memory_limit(MEMORY_LIMIT_BYTES)?;

    let globals = lua.globals();
    globals.set(
        "date",
        lua.create_function(|_, format: String| Ok(chrono::Utc::now().format(&format).to_string()))?,
    )?;
    globals.set("time", lua.create_function(|_, ()| Ok(chrono::Utc::now().timestamp()))?)?;
    globals.set("now", lua.create_function(|_, ()| Ok(chrono::Utc::now().to_rfc3339()))?)?;

    for name in ["os", "io", "debug", "package", "require", "dofile", "loadfile"] {
        globals.set(name, mlua::Nil)?;
    }

    Ok(lua)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(script: &str) -> Map<String, Value> {
        json!({ "script": script }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_table_result_becomes_output() {
        let context = ExecutionContext::from_payload(json!({ "order": { "qty": 3, "price": 4 } }));
        let outcome = TransformExecutor
            .execute(
                &config("return { total = context.order.qty * context.order.price, label = 'ok' }"),
                &context,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            StepOutcome::Completed(json!({ "total": 12, "label": "ok" }).as_object().cloned().unwrap())
        );
    }

    #[tokio::test]
    async fn test_scalar_result_is_wrapped() {
        let outcome = TransformExecutor
            .execute(&config("return 'hello'"), &ExecutionContext::new())
            .await
            .unwrap();
        assert_eq!(outcome, StepOutcome::from_value(json!({ "result": "hello" })));
    }

    #[tokio::test]
    async fn test_sandbox_removes_os() {
        let err = TransformExecutor
            .execute(&config("return os.time()"), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.message().contains("Lua execution failed"));
    }

    #[tokio::test]
    async fn test_syntax_error_is_config_error() {
        let err = TransformExecutor
            .execute(&config("return {"), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config(_)));
    }

    #[tokio::test]
    async fn test_missing_script_is_config_error() {
        let err = TransformExecutor
            .execute(&Map::new(), &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Config(_)));
    }
}
