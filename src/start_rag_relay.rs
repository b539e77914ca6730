//! Startup helpers for the relay server.

use std::process::ExitCode;

use anyhow::Context;

use crate::config::RelayConfig;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting RAG relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    log_config(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = runtime.block_on(serve(&config)) {
        tracing::error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Build the state and serve until Ctrl-C.
///
/// # Errors
/// Returns an error if the state cannot be created or the server fails.
pub async fn serve(config: &RelayConfig) -> anyhow::Result<()> {
    let state = AppState::new(config).context("failed to create state")?;
    server::run_server_with_shutdown(state, config.port, &config.static_dir, shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn log_config(config: &RelayConfig) {
    tracing::info!("Port: {}", config.port);
    tracing::info!("Project: {}", config.project_id.as_deref().unwrap_or("<unset>"));
    match &config.retrieval {
        Ok(retrieval) => tracing::info!(
            "Model {} in {} via {}",
            retrieval.model,
            retrieval.location,
            retrieval.source.kind()
        ),
        Err(e) => tracing::warn!("Retrieval not configured: {e}"),
    }
    tracing::info!(
        "Conversations: max {}, idle timeout {}s, history window {}",
        config.store.max_conversations,
        config.store.conversation_timeout.num_seconds(),
        config.history_window
    );
    tracing::info!("Request timeout: {:?}", config.request_timeout);
}
