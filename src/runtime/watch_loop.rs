//! # Watch Loop
//!
//! Feeds watch notifications into the dispatcher and runs the worker.
//!
//! Three watches are kept open: the RevisionOperator holding the revision
//! state, and the ConfigMaps and Secrets of the target namespace. Every
//! applied or deleted object enqueues a pass. The worker starts only after all
//! three delivered their initial list.

use crate::config::ControllerConfig;
use crate::constants::WATCHED_RESOURCE_COUNT;
use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::crd::RevisionOperator;
use crate::runtime::dispatcher::{Dispatcher, Trigger};
use crate::runtime::error_policy::handle_watch_error;
use anyhow::{bail, Result};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client, Resource};
use kube_runtime::watcher::{self, watcher, Event};
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Run the controller until `shutdown` turns true
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run_controller(
    client: Client,
    config: &ControllerConfig,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if config.workers != 1 {
        warn!(
            requested = config.workers,
            "Only one worker is supported, ignoring WORKERS={}",
            config.workers
        );
    }

    let dispatcher = Dispatcher::new(ExponentialBackoff::new(
        config.requeue_base_delay(),
        config.requeue_max_delay(),
    ));
    let trigger = dispatcher.trigger();
    let (synced_tx, mut synced_rx) = mpsc::channel(WATCHED_RESOURCE_COUNT);

    let watches = vec![
        spawn_watch(
            Api::<RevisionOperator>::all(client.clone()),
            watcher::Config::default()
                .fields(&format!("metadata.name={}", config.operator_resource_name)),
            "revisionoperator",
            trigger.clone(),
            synced_tx.clone(),
        ),
        spawn_watch(
            Api::<ConfigMap>::namespaced(client.clone(), &config.target_namespace),
            watcher::Config::default(),
            "configmaps",
            trigger.clone(),
            synced_tx.clone(),
        ),
        spawn_watch(
            Api::<Secret>::namespaced(client, &config.target_namespace),
            watcher::Config::default(),
            "secrets",
            trigger,
            synced_tx,
        ),
    ];

    info!(
        namespace = %config.target_namespace,
        "Waiting for initial watch lists..."
    );
    let mut pending = WATCHED_RESOURCE_COUNT;
    while pending > 0 {
        tokio::select! {
            synced = synced_rx.recv() => match synced {
                Some(resource) => {
                    pending -= 1;
                    debug!(resource, pending, "Watch cache synced");
                }
                None => {
                    stop_watches(&watches);
                    bail!("Watches ended before their initial lists completed");
                }
            },
            _ = shutdown.changed() => {
                info!("Shutdown requested before watch caches synced");
                stop_watches(&watches);
                return Ok(());
            }
        }
    }

    server_state.caches_synced.store(true, Ordering::Relaxed);
    info!("✅ Watch caches synced, starting worker");

    dispatcher.run(reconciler, shutdown).await;
    stop_watches(&watches);
    Ok(())
}

/// Watch one resource type, enqueueing a pass for every change
///
/// `synced` receives `resource` once, when the initial list is complete.
fn spawn_watch<K>(
    api: Api<K>,
    config: watcher::Config,
    resource: &'static str,
    trigger: Trigger,
    synced: mpsc::Sender<&'static str>,
) -> JoinHandle<()>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut synced = Some(synced);
        let mut stream = watcher(api, config).default_backoff().boxed();
        while let Some(event) = stream.next().await {
            match event {
                Ok(Event::Apply(_) | Event::Delete(_)) => trigger.enqueue(),
                Ok(Event::InitDone) => {
                    if let Some(tx) = synced.take() {
                        if tx.send(resource).await.is_err() {
                            debug!(resource, "Nobody waiting for initial sync");
                        }
                    }
                    trigger.enqueue();
                }
                Ok(Event::Init | Event::InitApply(_)) => {}
                Err(e) => handle_watch_error(resource, &e),
            }
        }
        warn!(resource, "Watch stream ended");
    })
}

fn stop_watches(watches: &[JoinHandle<()>]) {
    for handle in watches {
        handle.abort();
    }
}
