//! # Initialization
//!
//! Process setup: rustls, tracing, metrics, the HTTP server, the Kubernetes
//! client and the reconciler.

use crate::config::{load_config, ControllerConfig, ServerConfig};
use crate::controller::events::KubeEventSink;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::store::{KubeObjectStore, KubeRevisionStateClient};
use crate::crd::RevisionOperator;
use crate::observability;
use anyhow::{Context, Result};
use kube::{Api, Client};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything the watch loop needs
#[allow(
    missing_debug_implementations,
    reason = "kube::Client does not implement Debug"
)]
pub struct InitializationResult {
    pub client: Client,
    pub config: ControllerConfig,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// Installs the rustls crypto provider, sets up tracing, registers metrics,
/// starts the HTTP server and builds the reconciler on a Kubernetes client.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revision_controller=info".into()),
        )
        .init();

    info!("Starting Revision Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (config, server_config) = load_config();
    config.validate().context("Invalid controller configuration")?;
    info!(
        namespace = %config.target_namespace,
        operator = %config.operator_resource_name,
        config_maps = ?config.config_maps.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        secrets = ?config.secrets.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        "Loaded configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    check_operator_resource(&client, &config.operator_resource_name).await;

    let reconciler = Arc::new(Reconciler::new(
        config.target_namespace.clone(),
        config.config_maps.clone(),
        config.secrets.clone(),
        Arc::new(KubeObjectStore::new(client.clone())),
        Arc::new(KubeRevisionStateClient::new(
            client.clone(),
            config.operator_resource_name.clone(),
        )),
        Arc::new(KubeEventSink::new(client.clone(), &config.operator_resource_name)),
    ));

    info!("Controller initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        config,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to bind
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(server_config.poll_interval()).await;
    }
}

/// Report whether the RevisionOperator exists
///
/// Passes fail and retry until it does, so a missing object is not fatal.
async fn check_operator_resource(client: &Client, name: &str) {
    let api: Api<RevisionOperator> = Api::all(client.clone());
    match api.get_opt(name).await {
        Ok(Some(operator)) => {
            let revision = operator
                .status
                .as_ref()
                .map_or(0, |status| status.latest_available_revision);
            info!(
                operator = name,
                revision, "Found RevisionOperator, latest available revision {}", revision
            );
        }
        Ok(None) => {
            warn!(
                operator = name,
                "RevisionOperator {:?} not found, passes will fail until it is created", name
            );
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}
