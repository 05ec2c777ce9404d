mod worker;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vigil_config::{load_checks, Settings};
use vigil_incident::IncidentEngine;
use vigil_queue::{InMemoryEventBus, InMemoryTaskQueue};
use vigil_scheduler::Scheduler;
use vigil_store::{CheckRepository, InMemoryLeaseStore, InMemoryStore};

use worker::Worker;

/// Single-process uptime monitor: scheduler, probe worker, and incident
/// engine wired over in-memory repositories.
#[derive(Debug, Parser)]
#[command(name = "vigild", about = "vigil uptime monitoring daemon")]
struct Cli {
    /// Path to the settings YAML file. Defaults apply when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to a check seed YAML file loaded at startup.
    #[arg(long)]
    checks: Option<PathBuf>,

    /// Override the worker identity used as lease owner.
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(worker_id) = cli.worker_id {
        settings.scheduler.worker_id = Some(worker_id);
    }

    let store = Arc::new(InMemoryStore::new());
    let leases = Arc::new(InMemoryLeaseStore::new());
    let queue = Arc::new(InMemoryTaskQueue::new());
    let bus = Arc::new(InMemoryEventBus::new());

    if let Some(path) = &cli.checks {
        let checks = load_checks(path)?;
        info!(count = checks.len(), "seeding checks from {}", path.display());
        for check in checks {
            CheckRepository::create(store.as_ref(), &check).await?;
        }
    }

    let engine = Arc::new(IncidentEngine::new(
        settings.incident.clone(),
        store.clone(),
        bus.clone(),
    ));
    let scheduler = Scheduler::new(
        settings.scheduler.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        leases,
        queue.clone(),
    );
    scheduler.start().await?;

    let worker = Worker::new(store.clone(), store.clone(), queue.clone(), engine);
    let worker_handle = tokio::spawn(worker.run());

    shutdown_signal().await;
    info!("termination signal received, shutting down");
    scheduler.stop().await;
    queue.close();
    let _ = worker_handle.await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
