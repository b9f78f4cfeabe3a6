/// Step executor registry using ArcSwap
///
/// Maps step type tags to executors. One instance is built at process start
/// and shared by reference with the engine. Lookups are lock-free; each
/// registration swaps in a new map, so registering while executions run is
/// safe but expected to happen only during startup.

use super::{
    database::DatabaseExecutor, email::EmailExecutor, http::HttpExecutor,
    telegram::TelegramExecutor, transform::TransformExecutor, wait::WaitExecutor, EchoExecutor,
    StepExecutor,
};
use crate::{config::IntegrationsConfig, error::StepError};
use anyhow::Result;
use arc_swap::ArcSwap;
use sqlx::sqlite::SqlitePool;
use std::{collections::HashMap, sync::Arc};

pub struct StepExecutorRegistry {
    /// Key: step type tag, Value: executor
    executors: ArcSwap<HashMap<String, Arc<dyn StepExecutor>>>,
    /// Returned for unregistered types
    fallback: Arc<dyn StepExecutor>,
    /// When set, unregistered types are a configuration error
    strict: bool,
}

impl StepExecutorRegistry {
    /// Empty registry with the echo fallback
    pub fn new() -> Self {
        Self {
            executors: ArcSwap::new(Arc::new(HashMap::new())),
            fallback: Arc::new(EchoExecutor),
            strict: false,
        }
    }

    /// Registry preloaded with every built-in integration
    pub fn with_builtins(integrations: &IntegrationsConfig, pool: SqlitePool) -> Result<Self> {
        let registry = Self::new();
        let timeout = integrations.http_timeout();

        registry.register("http", Arc::new(HttpExecutor::new(timeout)?));
        registry.register("email", Arc::new(EmailExecutor::new(integrations, timeout)?));
        registry.register("telegram", Arc::new(TelegramExecutor::new(integrations, timeout)?));
        registry.register("database", Arc::new(DatabaseExecutor::new(pool)));
        registry.register("transform", Arc::new(TransformExecutor));
        registry.register("wait", Arc::new(WaitExecutor));

        tracing::info!("🧩 Registered {} built-in step executors", registry.registered_types().len());
        Ok(registry)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Register (or replace) the executor for a step type
    pub fn register(&self, step_type: &str, executor: Arc<dyn StepExecutor>) {
        let current = self.executors.load();
        let mut updated = (**current).clone();
        if updated.insert(step_type.to_string(), executor).is_some() {
            tracing::debug!("🔁 Replaced step executor: {}", step_type);
        }
        self.executors.store(Arc::new(updated));
    }

    /// Executor for a step type; never fails
    pub fn get(&self, step_type: &str) -> Arc<dyn StepExecutor> {
        match self.executors.load().get(step_type) {
            Some(executor) => Arc::clone(executor),
            None => {
                tracing::debug!("🪞 No executor registered for '{}', using echo", step_type);
                Arc::clone(&self.fallback)
            }
        }
    }

    /// Executor for a step type, honoring strict mode
    pub fn resolve(&self, step_type: &str) -> Result<Arc<dyn StepExecutor>, StepError> {
        if self.strict && !self.contains(step_type) {
            return Err(StepError::config(format!("unknown step type '{}'", step_type)));
        }
        Ok(self.get(step_type))
    }

    pub fn contains(&self, step_type: &str) -> bool {
        self.executors.load().contains_key(step_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.executors.load().keys().cloned().collect();
        types.sort();
        types
    }
}

impl Default for StepExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StepExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepExecutorRegistry")
            .field("types", &self.registered_types())
            .field("strict", &self.strict)
            .finish()
    }
}
