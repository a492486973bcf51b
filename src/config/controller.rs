//! # Reconciler Configuration
//!
//! What to track and how to pace retries.
//!
//! Tracked resources are given as comma separated names; a trailing `?` marks
//! a resource as optional:
//!
//! ```text
//! REVISION_CONFIGMAPS=kube-apiserver-pod,config,oauth-metadata?
//! REVISION_SECRETS=serving-cert,user-serving-cert?
//! ```

use super::parse_or_default;
use crate::constants::{
    DEFAULT_OPERATOR_RESOURCE_NAME, DEFAULT_REQUEUE_BASE_DELAY_MS, DEFAULT_REQUEUE_MAX_DELAY_SECS,
    DEFAULT_TARGET_NAMESPACE, DEFAULT_WORKERS,
};
use crate::controller::reconciler::TrackedResource;
use anyhow::{bail, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace holding sources, snapshots and status markers
    pub target_namespace: String,
    /// Name of the cluster-scoped RevisionOperator holding the revision state
    pub operator_resource_name: String,
    pub config_maps: Vec<TrackedResource>,
    pub secrets: Vec<TrackedResource>,
    /// Requested worker count; only one worker ever runs
    pub workers: usize,
    pub requeue_base_delay_ms: u64,
    pub requeue_max_delay_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            operator_resource_name: DEFAULT_OPERATOR_RESOURCE_NAME.to_string(),
            config_maps: Vec::new(),
            secrets: Vec::new(),
            workers: DEFAULT_WORKERS,
            requeue_base_delay_ms: DEFAULT_REQUEUE_BASE_DELAY_MS,
            requeue_max_delay_secs: DEFAULT_REQUEUE_MAX_DELAY_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let non_empty = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            target_namespace: non_empty("TARGET_NAMESPACE", DEFAULT_TARGET_NAMESPACE),
            operator_resource_name: non_empty(
                "OPERATOR_RESOURCE_NAME",
                DEFAULT_OPERATOR_RESOURCE_NAME,
            ),
            config_maps: parse_tracked_resources(&lookup("REVISION_CONFIGMAPS").unwrap_or_default()),
            secrets: parse_tracked_resources(&lookup("REVISION_SECRETS").unwrap_or_default()),
            workers: parse_or_default(&lookup, "WORKERS", DEFAULT_WORKERS),
            requeue_base_delay_ms: parse_or_default(
                &lookup,
                "REQUEUE_BASE_DELAY_MS",
                DEFAULT_REQUEUE_BASE_DELAY_MS,
            ),
            requeue_max_delay_secs: parse_or_default(
                &lookup,
                "REQUEUE_MAX_DELAY_SECS",
                DEFAULT_REQUEUE_MAX_DELAY_SECS,
            ),
        }
    }

    /// Reject configurations the reconciler cannot run with
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn validate(&self) -> Result<()> {
        if self.config_maps.is_empty() {
            bail!("REVISION_CONFIGMAPS must name at least one ConfigMap");
        }
        if self.requeue_base_delay_ms == 0 {
            bail!("REQUEUE_BASE_DELAY_MS must be greater than zero");
        }
        if Duration::from_millis(self.requeue_base_delay_ms) > self.requeue_max_delay() {
            bail!("REQUEUE_BASE_DELAY_MS must not exceed REQUEUE_MAX_DELAY_SECS");
        }
        Ok(())
    }

    pub fn requeue_base_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_base_delay_ms)
    }

    pub fn requeue_max_delay(&self) -> Duration {
        Duration::from_secs(self.requeue_max_delay_secs)
    }
}

/// Parse `name[?],name[?],...` into tracked resources, keeping the order
///
/// Blank entries are ignored.
pub fn parse_tracked_resources(value: &str) -> Vec<TrackedResource> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.strip_suffix('?') {
            Some(name) if !name.trim().is_empty() => Some(TrackedResource::optional(name.trim())),
            Some(_) => None,
            None => Some(TrackedResource::required(entry)),
        })
        .collect()
}
