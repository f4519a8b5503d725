//! mvirt-secgroup daemon: periodic security group reconciliation.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mvirt_secgroup::{
    Config, JsonSnapshotProvider, LoggingNotifier, SecGroupService, Storage, SyncStatus,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mvirt_secgroup=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::parse();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let storage = Storage::new(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    info!(path = %config.db_path.display(), "Storage initialized");

    let service = SecGroupService::new(
        Arc::new(storage),
        Arc::new(JsonSnapshotProvider::new(&config.snapshot)),
        Arc::new(LoggingNotifier),
    );

    if config.once {
        return run_once(&service, &config).await;
    }

    info!(
        project = %config.project,
        interval_secs = config.sync_interval().as_secs(),
        "Starting security group sync loop"
    );

    let mut sigint = signal(SignalKind::interrupt()).context("Failed to register SIGINT handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    let mut ticker = tokio::time::interval(config.sync_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = run_once(&service, &config).await {
                    error!(error = %e, "Reconciliation run failed, retrying next interval");
                }
            }
            _ = sigint.recv() => { info!("Received SIGINT"); break; }
            _ = sigterm.recv() => { info!("Received SIGTERM"); break; }
        }
    }

    info!("mvirt-secgroup stopped");
    Ok(())
}

async fn run_once(service: &SecGroupService, config: &Config) -> Result<()> {
    let outcome = service
        .sync_scope(&config.project, &config.credentials())
        .await
        .context("Security group sync failed")?;

    match outcome.result.status() {
        SyncStatus::Synced => info!(matched = outcome.local.len(), "Provider fully synced"),
        SyncStatus::Degraded => warn!(
            errors = outcome.result.error_count(),
            failures = ?outcome.result.failures,
            "Provider partially synced"
        ),
    }
    Ok(())
}
