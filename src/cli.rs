//! # revctl
//!
//! Command-line interface for inspecting the revisions kept by the Revision
//! Controller.
//!
//! ## Usage
//!
//! ```bash
//! # Latest revision and conditions of the RevisionOperator
//! revctl status --name cluster
//!
//! # Revisions present in the target namespace
//! revctl list --namespace openshift-kube-apiserver
//!
//! # Snapshot objects of one revision
//! revctl show --revision 3 --namespace openshift-kube-apiserver
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kube::{Api, Client};
use revision_controller::constants::{DEFAULT_OPERATOR_RESOURCE_NAME, DEFAULT_TARGET_NAMESPACE};
use revision_controller::controller::reconciler::naming::{is_status_marker, status_marker_name};
use revision_controller::controller::store::{
    KubeObjectStore, ObjectStore, ResourceKind, StoredObject,
};
use revision_controller::RevisionOperator;

/// Revision Controller CLI
#[derive(Parser)]
#[command(name = "revctl")]
#[command(about = "Inspect revisions kept by the Revision Controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target namespace holding the revisions
    #[arg(short, long, global = true, default_value = DEFAULT_TARGET_NAMESPACE)]
    namespace: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the latest available revision and conditions
    Status {
        /// Name of the RevisionOperator resource
        #[arg(long, default_value = DEFAULT_OPERATOR_RESOURCE_NAME)]
        name: String,
    },
    /// List revisions by their status markers, oldest first
    List,
    /// Show the objects belonging to one revision
    Show {
        #[arg(short, long)]
        revision: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "revctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::Status { name } => status_command(client, &name).await,
        Commands::List => list_command(client, &cli.namespace).await,
        Commands::Show { revision } => show_command(client, &cli.namespace, revision).await,
    }
}

async fn status_command(client: Client, name: &str) -> Result<()> {
    let api: Api<RevisionOperator> = Api::all(client);
    let operator = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get RevisionOperator '{name}'"))?;

    println!("RevisionOperator '{name}':\n");
    println!("  Management State: {:?}", operator.spec.management_state);

    let Some(status) = operator.status else {
        println!("\nStatus: No status available (no revision created yet)");
        return Ok(());
    };

    println!("  Latest Available Revision: {}", status.latest_available_revision);
    if !status.conditions.is_empty() {
        println!("\nConditions:");
        for condition in &status.conditions {
            println!("  {}: {}", condition.r#type, condition.status);
            if let Some(ref reason) = condition.reason {
                println!("    Reason: {reason}");
            }
            if let Some(ref message) = condition.message {
                println!("    Message: {message}");
            }
            if let Some(ref time) = condition.last_transition_time {
                println!("    Last Transition: {time}");
            }
        }
    }
    Ok(())
}

async fn list_command(client: Client, namespace: &str) -> Result<()> {
    let store = KubeObjectStore::new(client);
    let config_maps = store
        .list(ResourceKind::ConfigMap, namespace)
        .await
        .with_context(|| format!("Failed to list ConfigMaps in '{namespace}'"))?;

    let mut markers: Vec<(Option<i32>, &StoredObject)> = config_maps
        .iter()
        .filter(|cm| is_status_marker(&cm.name))
        .map(|cm| {
            let revision = cm
                .payload
                .text_value("revision")
                .and_then(|v| v.trim().parse().ok());
            (revision, cm)
        })
        .collect();
    markers.sort_by_key(|(revision, cm)| (revision.unwrap_or(i32::MAX), cm.name.clone()));

    if markers.is_empty() {
        println!("No revisions found in namespace '{namespace}'.");
        return Ok(());
    }

    println!("{:<10} {:<30} {:<15}", "REVISION", "MARKER", "STATUS");
    println!("{}", "-".repeat(55));
    for (revision, marker) in markers {
        let revision = revision.map_or_else(|| "?".to_string(), |r| r.to_string());
        let status = marker.payload.text_value("status").unwrap_or("-");
        println!("{:<10} {:<30} {:<15}", revision, marker.name, status);
    }
    Ok(())
}

async fn show_command(client: Client, namespace: &str, revision: i32) -> Result<()> {
    let store = KubeObjectStore::new(client);
    let marker_name = status_marker_name(revision);
    let marker = store
        .get(ResourceKind::ConfigMap, namespace, &marker_name)
        .await
        .with_context(|| format!("Failed to get status marker '{namespace}/{marker_name}'"))?
        .with_context(|| format!("Revision {revision} not found in namespace '{namespace}'"))?;

    println!("Revision {revision} in namespace '{namespace}':\n");
    println!("  Marker: {}", marker.name);
    if let Some(status) = marker.payload.text_value("status") {
        println!("  Status: {status}");
    }

    let mut owned = Vec::new();
    for kind in [ResourceKind::ConfigMap, ResourceKind::Secret] {
        let objects = store
            .list(kind, namespace)
            .await
            .with_context(|| format!("Failed to list {} in '{namespace}'", kind.plural()))?;
        owned.extend(objects.into_iter().filter(|object| {
            object
                .owner
                .as_ref()
                .is_some_and(|owner| owner.name == marker.name && Some(&owner.uid) == marker.uid.as_ref())
        }));
    }

    if owned.is_empty() {
        println!("\nNo snapshot objects found (revision may be incomplete).");
        return Ok(());
    }

    println!("\n{:<12} {:<40} {:<6}", "KIND", "NAME", "KEYS");
    println!("{}", "-".repeat(60));
    for object in owned {
        println!(
            "{:<12} {:<40} {:<6}",
            object.kind(),
            object.name,
            object.payload.len()
        );
    }
    Ok(())
}
