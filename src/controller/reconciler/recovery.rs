//! # Revision Recovery
//!
//! Rebuilds the revision counter from the status markers left in the cluster.

use crate::controller::reconciler::naming::is_status_marker;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::store::ResourceKind;
use tracing::{debug, warn};

impl Reconciler {
    /// Highest revision recorded by a status marker, or 0 when there is none
    ///
    /// Markers whose `revision` entry is missing or not an integer are skipped.
    pub async fn recover_latest_revision(&self) -> Result<i32, ReconcilerError> {
        let config_maps = self
            .store
            .list(ResourceKind::ConfigMap, &self.target_namespace)
            .await?;

        let mut latest = 0;
        for marker in config_maps.iter().filter(|cm| is_status_marker(&cm.name)) {
            let Some(value) = marker.payload.text_value("revision") else {
                warn!(marker = %marker.name, "Status marker has no revision entry, skipping");
                continue;
            };
            match value.trim().parse::<i32>() {
                Ok(revision) => latest = latest.max(revision),
                Err(e) => {
                    warn!(
                        marker = %marker.name,
                        value,
                        error = %e,
                        "Status marker has an invalid revision, skipping"
                    );
                }
            }
        }

        debug!(
            namespace = %self.target_namespace,
            revision = latest,
            "Recovered latest revision from status markers"
        );
        Ok(latest)
    }
}
