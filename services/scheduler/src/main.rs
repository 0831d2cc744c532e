//! armada Scheduler
//!
//! Runs the scheduler engine wired to in-memory collaborators and the
//! recording mock driver. The real cluster-manager driver, REST layer,
//! and persistent repository are separate services that plug into the
//! same seams.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use armada_scheduler::config::SchedulerConfig;
use armada_scheduler::driver::MockDriver;
use armada_scheduler::engine::SchedulerEngine;
use armada_scheduler::health::NoopHealthCheckManager;
use armada_scheduler::leadership::{InMemoryFrameworkIdStore, NoopLeadershipCoordinator};
use armada_scheduler::repository::InMemoryAppRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting armada scheduler");

    let config = SchedulerConfig::from_env()?;
    info!(
        task_launch_timeout_secs = config.task_launch_timeout.as_secs(),
        reconciliation_delay_secs = config.reconciliation_delay.as_secs(),
        "Configuration loaded"
    );

    let engine = Arc::new(SchedulerEngine::new(
        Arc::new(MockDriver::new()),
        Arc::new(InMemoryAppRepository::new()),
        Arc::new(NoopHealthCheckManager::new()),
        Arc::new(NoopLeadershipCoordinator::new()),
        Arc::new(InMemoryFrameworkIdStore::new()),
        config,
    ));

    engine.registered("framework-local".parse()?).await;
    info!("Scheduler engine ready");

    let mut shutdown = engine.shutdown_signal();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
        }
        _ = shutdown.changed() => {
            info!("Engine requested shutdown");
        }
    }

    Ok(())
}
