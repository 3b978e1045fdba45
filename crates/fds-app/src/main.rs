//! FDS analytics agent binary - composition root.
//!
//! Ties together all agent crates into a single executable:
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Build the operation catalog
//! 3. Connect the model client and the analytics tool invoker
//! 4. Start the axum REST API server with the chat orchestrator

use std::sync::Arc;

use clap::Parser;

use fds_core::config::FdsConfig;
use fds_tools::{Catalog, HttpToolInvoker};

use fds_api::routes;
use fds_api::state::AppState;
use fds_chat::{ChatOrchestrator, OpenAiModelClient};

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = FdsConfig::load_or_default(&config_file);
    config.general.port = args.resolve_port(config.general.port);
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting FDS analytics agent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Operation catalog.
    let catalog = Arc::new(Catalog::analytics());
    tracing::info!(
        operations = catalog.operations().len(),
        tenant = %config.chat.tenant_id,
        "Analytics catalog ready"
    );

    // Model client and tool invoker.
    let model = OpenAiModelClient::new(&config.model)?;
    let invoker = HttpToolInvoker::new(&config.tools)?;
    tracing::info!(
        model = %config.model.model,
        tools = %config.tools.base_url,
        "Model and tool server connected"
    );

    // Orchestrator and API state.
    let orchestrator =
        ChatOrchestrator::new(catalog, Arc::new(model), Arc::new(invoker), config.chat.clone());
    let state = AppState::new(config.clone(), orchestrator);

    // API server.
    if let Err(e) = routes::start_server(&config, state).await {
        tracing::error!(error = %e, "Server failed — is another instance running?");
        return Err(e.into());
    }

    Ok(())
}
