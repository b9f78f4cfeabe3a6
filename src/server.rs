/// Server setup and initialization
///
/// Wires together all components: storage, step registry, execution engine,
/// job queue, worker and HTTP routes.

use crate::{
    api::{create_execution_routes, create_webhook_routes, AppState},
    config::Config,
    runtime::{
        engine::WorkflowExecutor,
        notification::{LogNotifier, Notifier, WebhookNotifier},
        worker::{JobQueue, Worker, DEFAULT_QUEUE_CAPACITY},
    },
    steps::StepExecutorRegistry,
    workflow::{
        storage::{ExecutionStore, SqliteStore},
        types::Workflow,
    },
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Create the main Axum application and start the background worker
///
/// Opens the SQLite store, imports workflow definitions, registers the
/// built-in step executors and spawns the queue consumer.
pub async fn create_app(config: Config) -> Result<Router> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    let db_path = config.database.database_path();
    tracing::info!("🗄️ Opening execution store: {}", db_path.display());
    let sqlite = SqliteStore::open(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open execution store: {}", e))?;
    let pool = sqlite.pool().clone();
    let store: Arc<dyn ExecutionStore> = Arc::new(sqlite);

    if let Some(dir) = &config.database.workflows_dir {
        let imported = import_workflows(store.as_ref(), Path::new(dir)).await?;
        tracing::info!("📥 Imported {} workflow definitions from {}", imported, dir);
    }

    tracing::info!("🧩 Initializing step executor registry");
    let registry = Arc::new(
        StepExecutorRegistry::with_builtins(&config.integrations, pool)?
            .strict(config.engine.strict_step_types),
    );

    let notifier: Arc<dyn Notifier> = match &config.engine.notify_url {
        Some(url) => {
            tracing::info!("📣 Notifications go to {}", url);
            Arc::new(WebhookNotifier::new(url.clone(), config.integrations.http_timeout())?)
        }
        None => {
            tracing::info!("📣 No notification URL configured; notifications are logged");
            Arc::new(LogNotifier)
        }
    };

    tracing::info!("🚀 Initializing workflow executor");
    let engine = Arc::new(WorkflowExecutor::new(
        registry,
        Arc::clone(&store),
        notifier,
        config.engine.default_retry(),
    ));

    let (queue, receiver) = JobQueue::new(DEFAULT_QUEUE_CAPACITY);
    let worker = Worker::new(
        engine,
        queue.clone(),
        config.engine.max_concurrent_executions,
    );
    tokio::spawn(worker.run(receiver));

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = build_router(AppState { queue, store });

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Intake routes over the given state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_webhook_routes())
        .merge(create_execution_routes())
        .with_state(state)
}

/// Load every `*.json` workflow definition in `dir` into the store
///
/// Invalid files are skipped with a warning; a missing directory is an error.
pub async fn import_workflows(store: &dyn ExecutionStore, dir: &Path) -> Result<usize> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read workflows directory {}: {}", dir.display(), e))?;

    let mut imported = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        let raw = tokio::fs::read_to_string(&path).await?;
        let workflow: Workflow = match serde_json::from_str(&raw) {
            Ok(workflow) => workflow,
            Err(e) => {
                tracing::warn!("⚠️ Skipping {}: invalid workflow JSON: {}", path.display(), e);
                continue;
            }
        };
        if let Err(e) = workflow.validate() {
            tracing::warn!("⚠️ Skipping {}: {}", path.display(), e);
            continue;
        }

        store.save_workflow(&workflow).await?;
        tracing::debug!("📋 Imported workflow {} ({})", workflow.id, workflow.name);
        imported += 1;
    }

    Ok(imported)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chainway=info")),
        )
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting Chainway server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
