/// Fallback executor for unregistered step types
///
/// Returns the templated config plus `_executed: true` and `_contextKeys`, so
/// draft step types do not break an execution and debug tooling can tell that
/// no real integration ran.

use super::{StepExecutor, StepOutcome};
use crate::{error::StepError, workflow::types::ExecutionContext};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[derive(Debug, Default, Clone)]
pub struct EchoExecutor;

#[async_trait]
impl StepExecutor for EchoExecutor {
    async fn execute(
        &self,
        config: &Map<String, Value>,
        context: &ExecutionContext,
    ) -> Result<StepOutcome, StepError> {
        let mut output = config.clone();
        output.insert("_executed".to_string(), Value::Bool(true));
        output.insert(
            "_contextKeys".to_string(),
            Value::Array(context.keys().into_iter().map(Value::String).collect()),
        );
        Ok(StepOutcome::Completed(output))
    }
}
