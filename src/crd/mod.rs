//! # Custom Resource Definitions
//!
//! CRD types for the Revision Controller.
//!
//! The `RevisionOperator` resource carries the authoritative revision state: the
//! management state read by the controller and the `latestAvailableRevision`
//! counter it advances.

mod status;

pub use status::{Condition, RevisionOperatorStatus};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RevisionOperator Custom Resource Definition
///
/// Singleton, cluster-scoped resource holding the revision counter for one
/// target namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: revision.microscaler.io/v1
/// kind: RevisionOperator
/// metadata:
///   name: cluster
/// spec:
///   managementState: Managed
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "RevisionOperator",
    group = "revision.microscaler.io",
    version = "v1",
    status = "RevisionOperatorStatus",
    shortname = "revop",
    printcolumn = r#"{"name":"Managed", "type":"string", "jsonPath":".spec.managementState"}, {"name":"Revision", "type":"integer", "jsonPath":".status.latestAvailableRevision"}, {"name":"Degraded", "type":"string", "jsonPath":".status.conditions[?(@.type==\"RevisionControllerDegraded\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RevisionOperatorSpec {
    /// Whether the controller is allowed to mutate anything
    /// Values: Managed, Force, Unmanaged, Removed
    /// Default: Managed
    #[serde(default)]
    pub management_state: ManagementState,
}

/// Operational mode of the owning system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ManagementState {
    /// Controller reconciles normally
    #[default]
    Managed,
    /// Managed, with the owner asking for changes to be forced through
    Force,
    /// Controller leaves everything untouched
    Unmanaged,
    /// Owner is being removed; controller leaves everything untouched
    Removed,
}

impl ManagementState {
    /// Whether passes may mutate anything in this state
    pub fn is_managed(self) -> bool {
        matches!(self, ManagementState::Managed | ManagementState::Force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_states() {
        assert!(ManagementState::Managed.is_managed());
        assert!(ManagementState::Force.is_managed());
        assert!(!ManagementState::Unmanaged.is_managed());
        assert!(!ManagementState::Removed.is_managed());
    }

    #[test]
    fn test_management_state_defaults_to_managed() {
        let spec: RevisionOperatorSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.management_state, ManagementState::Managed);
    }

    #[test]
    fn test_status_deserializes_camel_case() {
        let status: RevisionOperatorStatus = serde_json::from_str(
            r#"{"latestAvailableRevision": 7, "conditions": [{"type": "RevisionControllerDegraded", "status": "False"}]}"#,
        )
        .unwrap();
        assert_eq!(status.latest_available_revision, 7);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].r#type, "RevisionControllerDegraded");
    }

    #[test]
    fn test_crd_is_cluster_scoped() {
        use kube::CustomResourceExt;
        let crd = RevisionOperator::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "revision.microscaler.io");
    }
}
