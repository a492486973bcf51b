//! # Reconciler Types
//!
//! The reconciler context and its error type.

use crate::controller::events::EventSink;
use crate::controller::store::{ObjectStore, ResourceKind, RevisionStateClient, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// A source object copied into every revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedResource {
    pub name: String,
    /// Allows the source to be absent without counting as drift or error
    pub optional: bool,
}

impl TrackedResource {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
        }
    }
}

/// Reconciler context
///
/// Holds the immutable tracking configuration and the injected capabilities.
/// Carries no state between passes.
pub struct Reconciler {
    pub(crate) target_namespace: String,
    /// The first entry is by convention the primary payload consumed downstream
    pub(crate) config_maps: Vec<TrackedResource>,
    pub(crate) secrets: Vec<TrackedResource>,
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) state: Arc<dyn RevisionStateClient>,
    pub(crate) events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("target_namespace", &self.target_namespace)
            .field("config_maps", &self.config_maps)
            .field("secrets", &self.secrets)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        target_namespace: impl Into<String>,
        config_maps: Vec<TrackedResource>,
        secrets: Vec<TrackedResource>,
        store: Arc<dyn ObjectStore>,
        state: Arc<dyn RevisionStateClient>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            target_namespace: target_namespace.into(),
            config_maps,
            secrets,
            store,
            state,
            events,
        }
    }

    pub fn target_namespace(&self) -> &str {
        &self.target_namespace
    }

    /// Tracked ConfigMaps followed by tracked Secrets
    pub(crate) fn tracked(&self) -> impl Iterator<Item = (ResourceKind, &TrackedResource)> + '_ {
        self.config_maps
            .iter()
            .map(|resource| (ResourceKind::ConfigMap, resource))
            .chain(
                self.secrets
                    .iter()
                    .map(|resource| (ResourceKind::Secret, resource)),
            )
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A non-optional source or snapshot object does not exist
    #[error("{} \"{}\" not found", .kind.plural(), .name)]
    NotFound { kind: ResourceKind, name: String },

    /// Creating the objects of a new revision failed
    #[error("{source}")]
    ContentCreation {
        revision: i32,
        source: Box<ReconcilerError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Writing the degraded condition failed on an otherwise clean pass
    #[error("failed to update RevisionControllerDegraded condition: {0}")]
    StatusUpdate(#[source] StoreError),

    /// The revision counter cannot be advanced any further
    #[error("revision counter exhausted at {0}")]
    RevisionOverflow(i32),

    /// The pass task panicked or was cancelled
    #[error("reconciliation pass aborted: {0}")]
    Aborted(String),
}

impl ReconcilerError {
    /// Reason recorded on the degraded condition for this error
    pub fn condition_reason(&self) -> &'static str {
        match self {
            ReconcilerError::ContentCreation { .. } => "ContentCreationError",
            _ => "Error",
        }
    }

    /// Short label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilerError::NotFound { .. } => "not_found",
            ReconcilerError::ContentCreation { .. } => "content_creation",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::StatusUpdate(_) => "status_update",
            ReconcilerError::RevisionOverflow(_) => "revision_overflow",
            ReconcilerError::Aborted(_) => "aborted",
        }
    }
}
