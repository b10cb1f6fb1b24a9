mod config;
mod discovery;
mod error;
mod fingerprint;
mod probe;
mod rancher;
mod scheduler;
mod sink;
mod writer;
#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::config::Config;
use crate::discovery::Discovery;
use crate::sink::ErrorSink;
use crate::writer::TargetWriter;

const DEFAULT_CONFIG_PATH: &str = "/etc/rancher-sd/rancher-sd.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rancher_sd=info"))
        )
        .init();

    tracing::info!("Starting rancher-sd");

    // Config file is optional; environment variables override it
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::resolve(config_path.as_deref(), Path::new(DEFAULT_CONFIG_PATH))
        .context("Invalid configuration")?;

    tracing::info!(
        "Watching project {} on {}",
        config.rancher.project,
        config.rancher.url
    );

    if let Some(existing) = fingerprint::of_file(&config.output.file) {
        tracing::info!("Existing target file fingerprint: {}", existing);
    }

    // Held until shutdown; dropping it flushes pending Sentry events
    let sentry_guard = sink::init_sentry(&config.error_sink)?;
    let (sink, sink_handle) = ErrorSink::spawn(&config.error_sink)?;
    let discovery = Discovery::new(&config)?;
    let writer = TargetWriter::new(config.output.file.clone());

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    let scheduler_handle = tokio::spawn(scheduler::run(
        discovery,
        writer,
        sink.clone(),
        config.discovery.period(),
        cancel.clone(),
    ));

    shutdown_signal().await?;

    tracing::info!("Shutdown signal received");

    // In-flight cycle finishes, no new one starts
    cancel.cancel();

    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task failed: {}", e);
    }

    if let Err(e) = sink.shutdown().await {
        tracing::error!("Failed to shutdown error sink: {}", e);
    }
    let _ = sink_handle.await;
    drop(sentry_guard);

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())
            .context("Failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    Ok(())
}
