// crates/server/src/main.rs
//! ttsweb server binary.
//!
//! Parses settings, installs logging and metrics, starts the job sweeper and
//! serves until Ctrl-C. On shutdown the gate closes so queued jobs fail fast,
//! and the sweeper is stopped after its in-flight pass.

use anyhow::{Context, Result};
use clap::Parser;
use ttsweb_observability::init_logging;
use ttsweb_server::{create_app, init_metrics, AppState, Settings};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::parse();

    init_logging(&settings.log_level, settings.log_format)
        .context("failed to initialise logging")?;
    init_metrics();

    let addr = settings.bind_addr();
    let state = AppState::with_mock_backend(settings);
    state.store().start_sweep();

    let info = state.backend().info();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        mock_mode = info.mock_mode,
        gpu_available = info.gpu_available,
        max_concurrent_jobs = state.gate().capacity(),
        "Starting ttsweb"
    );

    let app = create_app(state.clone());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.orchestrator.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
