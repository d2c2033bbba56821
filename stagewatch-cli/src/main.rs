//! stagewatchd: run a configured workflow on a schedule and alert on new
//! entities.

use anyhow::{Context, Result};
use clap::Parser;
use stagewatch_cli::{daemon, Cli};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_filter());

    if let Err(e) = run(cli).await {
        tracing::error!(error = format!("{e:#}"), "fatal");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let scheduler = daemon::prepare(&cli)
        .with_context(|| format!("failed to start from {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    tokio::spawn(handle_signals(cancel.clone()));

    let summary = scheduler.run(cancel).await;
    tracing::info!(
        runs = summary.runs,
        halted = summary.halted,
        warnings = summary.warnings,
        "stagewatchd stopped"
    );
    Ok(())
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Cancels `cancel` on the first SIGINT or SIGTERM. A second signal aborts
/// without waiting for the in-flight run.
async fn handle_signals(cancel: CancellationToken) {
    if let Err(e) = shutdown_signal().await {
        tracing::error!(error = %e, "failed to install signal handler");
        return;
    }
    tracing::info!("shutdown requested; finishing current run");
    cancel.cancel();

    if shutdown_signal().await.is_ok() {
        tracing::warn!("second shutdown signal; aborting");
        std::process::exit(130);
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
