/// Chainway: linear workflow execution engine
///
/// Main entry point for the Chainway server. Loads configuration from the
/// environment and starts the intake server and the job worker.

use chainway::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Webhook triggers at /webhook/{workflow_id}
/// - Manual runs at /api/workflows/{id}/run
/// - Execution inspection and resume at /api/executions/{id}
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
