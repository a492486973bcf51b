//! # Revision Controller
//!
//! A Kubernetes controller that keeps an immutable, numbered history of a set
//! of ConfigMaps and Secrets.
//!
//! ## Overview
//!
//! Whenever a tracked source object changes, the controller:
//!
//! 1. **Detects drift** - Compares every source against its copy in the latest revision
//! 2. **Creates a revision** - Copies all sources into `<name>-<n+1>` objects owned by a
//!    `revision-status-<n+1>` marker
//! 3. **Advances the counter** - Bumps `status.latestAvailableRevision` on the
//!    `RevisionOperator` resource with an optimistic-concurrency write
//!
//! Consumers read a fixed revision instead of the mutable sources, so a rollout in
//! flight always sees a consistent snapshot.
//!
//! ## Features
//!
//! - **Idempotent creation**: Re-running a partially created revision completes it
//! - **Counter recovery**: A lost counter is rebuilt from the status markers
//! - **Coalescing queue**: Bursts of watch events collapse into one pass
//! - **Prometheus metrics** and **health probes** on the HTTP server

use anyhow::Result;
use revision_controller::runtime::initialization::initialize;
use revision_controller::runtime::watch_loop::run_controller;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, stopping after the current pass");
        if shutdown_tx.send(true).is_err() {
            warn!("Controller already stopped");
        }
    });

    run_controller(
        init_result.client,
        &init_result.config,
        init_result.reconciler,
        init_result.server_state,
        shutdown_rx,
    )
    .await?;

    info!("Revision Controller stopped");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
