//! `serve` command handler.

use anyhow::{Context, Result};

use voucherd::api::server::{start_server, AppState};
use voucherd::config::Config;
use voucherd::orchestrator::VoucherOrchestrator;

/// Start the HTTP API with optional bind/port overrides.
pub(crate) async fn cmd_serve(
    mut config: Config,
    bind: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let orchestrator = VoucherOrchestrator::from_config(&config)
        .with_context(|| "Failed to initialise the generation backend")?;
    tracing::info!(
        base_url = %config.generation.base_url,
        model = %config.generation.model,
        "Generation backend configured"
    );

    start_server(&config.server, AppState::new(orchestrator))
        .await
        .map_err(|e| anyhow::anyhow!("API server failed: {e}"))
}
