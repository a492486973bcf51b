//! # Drift Detection
//!
//! Compares every tracked source object against its snapshot in a revision.

use crate::controller::reconciler::naming::name_for;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::store::{Payload, ResourceKind};
use tracing::{debug, warn};

/// Verdict on whether a revision still matches its sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionCheck {
    pub current: bool,
    /// Empty when current; otherwise every cause, comma separated
    pub reason: String,
}

impl RevisionCheck {
    fn current() -> Self {
        Self {
            current: true,
            reason: String::new(),
        }
    }

    fn stale(reason: String) -> Self {
        Self {
            current: false,
            reason,
        }
    }
}

impl Reconciler {
    /// Check whether `revision` holds exactly the current source payloads
    ///
    /// A missing non-optional object ends the check with the not-found text as
    /// reason. Otherwise all tracked resources are compared and every mismatch
    /// is reported, secrets first.
    pub async fn is_current(&self, revision: i32) -> RevisionCheck {
        let mut config_changes = Vec::new();
        let mut secret_changes = Vec::new();

        for (kind, resource) in self.tracked() {
            let snapshot_name = name_for(&resource.name, revision);
            let required = match self.read_payload(kind, &resource.name, resource.optional).await {
                Ok(payload) => payload,
                Err(e) => return RevisionCheck::stale(e.to_string()),
            };
            let existing = match self.read_payload(kind, &snapshot_name, resource.optional).await {
                Ok(payload) => payload,
                Err(e) => return RevisionCheck::stale(e.to_string()),
            };

            if existing != required {
                debug!(
                    kind = %kind,
                    name = %resource.name,
                    revision,
                    changed_keys = ?existing.changed_keys(&required),
                    "{} {:?} changes for revision {}",
                    kind,
                    resource.name,
                    revision
                );
                let change = format!("{kind}/{} has changed", resource.name);
                match kind {
                    ResourceKind::ConfigMap => config_changes.push(change),
                    ResourceKind::Secret => secret_changes.push(change),
                }
            }
        }

        if secret_changes.is_empty() && config_changes.is_empty() {
            return RevisionCheck::current();
        }
        secret_changes.extend(config_changes);
        RevisionCheck::stale(secret_changes.join(","))
    }

    /// Payload of one object for comparison purposes
    ///
    /// Missing optional objects and objects that could not be read compare as
    /// empty. A read failure can hide real drift until a later pass reads
    /// successfully.
    async fn read_payload(
        &self,
        kind: ResourceKind,
        name: &str,
        optional: bool,
    ) -> Result<Payload, ReconcilerError> {
        match self.store.get(kind, &self.target_namespace, name).await {
            Ok(Some(object)) => Ok(object.payload),
            Ok(None) if !optional => Err(ReconcilerError::NotFound {
                kind,
                name: name.to_string(),
            }),
            Ok(None) => Ok(Payload::empty(kind)),
            Err(e) => {
                warn!(
                    kind = %kind,
                    name,
                    error = %e,
                    "Failed to read object, comparing it as empty"
                );
                Ok(Payload::empty(kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::reconciler::testing::Fixture;
    use crate::controller::reconciler::TrackedResource;
    use crate::controller::store::ResourceKind;

    fn fixture() -> Fixture {
        let fixture = Fixture::new(
            vec![
                TrackedResource::required("manifest"),
                TrackedResource::required("config"),
            ],
            vec![TrackedResource::required("serving-cert")],
        );
        fixture.put_config_map("manifest", &[("pod.yaml", "v1")]);
        fixture.put_config_map("config", &[("config.yaml", "a: 1")]);
        fixture.put_secret("serving-cert", &[("tls.crt", b"cert")]);
        fixture.put_config_map("manifest-1", &[("pod.yaml", "v1")]);
        fixture.put_config_map("config-1", &[("config.yaml", "a: 1")]);
        fixture.put_secret("serving-cert-1", &[("tls.crt", b"cert")]);
        fixture
    }

    #[tokio::test]
    async fn test_matching_revision_is_current_with_empty_reason() {
        let fixture = fixture();
        let check = fixture.reconciler.is_current(1).await;
        assert!(check.current);
        assert_eq!(check.reason, "");
    }

    #[tokio::test]
    async fn test_single_change_names_only_that_resource() {
        let fixture = fixture();
        fixture.put_config_map("config", &[("config.yaml", "a: 2")]);

        let check = fixture.reconciler.is_current(1).await;
        assert!(!check.current);
        assert_eq!(check.reason, "configmap/config has changed");
    }

    #[tokio::test]
    async fn test_all_changes_reported_secrets_first() {
        let fixture = fixture();
        fixture.put_config_map("manifest", &[("pod.yaml", "v2")]);
        fixture.put_secret("serving-cert", &[("tls.crt", b"rotated")]);

        let check = fixture.reconciler.is_current(1).await;
        assert!(!check.current);
        assert_eq!(
            check.reason,
            "secret/serving-cert has changed,configmap/manifest has changed"
        );
    }

    #[tokio::test]
    async fn test_added_key_is_drift() {
        let fixture = fixture();
        fixture.put_config_map("manifest", &[("pod.yaml", "v1"), ("extra", "x")]);
        assert!(!fixture.reconciler.is_current(1).await.current);
    }

    #[tokio::test]
    async fn test_missing_required_source_reports_not_found() {
        let fixture = fixture();
        fixture
            .store
            .remove(ResourceKind::ConfigMap, "test-ns", "manifest");

        let check = fixture.reconciler.is_current(1).await;
        assert!(!check.current);
        assert_eq!(check.reason, "configmaps \"manifest\" not found");
    }

    #[tokio::test]
    async fn test_missing_snapshot_reports_not_found() {
        let fixture = fixture();
        let check = fixture.reconciler.is_current(2).await;
        assert!(!check.current);
        assert_eq!(check.reason, "configmaps \"manifest-2\" not found");
    }

    #[tokio::test]
    async fn test_optional_absent_on_both_sides_is_current() {
        let fixture = Fixture::new(
            vec![TrackedResource::required("manifest")],
            vec![TrackedResource::optional("cert")],
        );
        fixture.put_config_map("manifest", &[("a", "1")]);
        fixture.put_config_map("manifest-1", &[("a", "1")]);

        let check = fixture.reconciler.is_current(1).await;
        assert!(check.current);
        assert!(check.reason.is_empty());
    }

    #[tokio::test]
    async fn test_optional_appearing_is_drift() {
        let fixture = Fixture::new(
            vec![TrackedResource::required("manifest")],
            vec![TrackedResource::optional("cert")],
        );
        fixture.put_config_map("manifest", &[("a", "1")]);
        fixture.put_config_map("manifest-1", &[("a", "1")]);
        fixture.put_secret("cert", &[("tls.crt", b"new")]);

        let check = fixture.reconciler.is_current(1).await;
        assert!(!check.current);
        assert_eq!(check.reason, "secret/cert has changed");
    }

    #[tokio::test]
    async fn test_empty_source_matches_missing_optional_snapshot() {
        let fixture = Fixture::new(vec![TrackedResource::optional("extra")], vec![]);
        fixture.put_config_map("extra", &[]);
        assert!(fixture.reconciler.is_current(1).await.current);
    }

    #[tokio::test]
    async fn test_read_failure_compares_as_empty_and_can_mask_drift() {
        let fixture = Fixture::new(vec![TrackedResource::required("manifest")], vec![]);
        fixture.put_config_map("manifest", &[("a", "2")]);
        fixture.put_config_map("manifest-1", &[("a", "1")]);
        fixture.store.fail_gets(ResourceKind::ConfigMap, "manifest");
        fixture.store.fail_gets(ResourceKind::ConfigMap, "manifest-1");

        // Both sides unreadable: both compare as empty, drift goes unnoticed
        let check = fixture.reconciler.is_current(1).await;
        assert!(check.current);

        fixture.store.clear_failures();
        assert!(!fixture.reconciler.is_current(1).await.current);
    }

    #[tokio::test]
    async fn test_read_failure_on_one_side_reports_change() {
        let fixture = Fixture::new(vec![TrackedResource::required("manifest")], vec![]);
        fixture.put_config_map("manifest", &[("a", "1")]);
        fixture.put_config_map("manifest-1", &[("a", "1")]);
        fixture.store.fail_gets(ResourceKind::ConfigMap, "manifest-1");

        let check = fixture.reconciler.is_current(1).await;
        assert!(!check.current);
        assert_eq!(check.reason, "configmap/manifest has changed");
    }
}
