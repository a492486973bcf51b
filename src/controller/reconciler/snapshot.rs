//! # Revision Snapshots
//!
//! Creates the status marker and the snapshot objects of a revision.
//!
//! All sources are read before anything is written, so a missing mandatory
//! source leaves no marker behind. Every write tolerates the object already
//! existing, so running the creator again for the same revision completes a
//! partially created revision and is a no-op for a complete one.

use crate::constants::STATUS_MARKER_IN_PROGRESS;
use crate::controller::reconciler::naming::{name_for, status_marker_name};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::store::{OwnerRef, Payload, ResourceKind, StoredObject};
use tracing::{debug, info};

impl Reconciler {
    /// Create all objects of `revision`
    ///
    /// Stops at the first failure. Objects already created stay in place.
    pub async fn create_revision(&self, revision: i32) -> Result<(), ReconcilerError> {
        let sources = self.read_sources().await?;
        let marker = self.ensure_status_marker(revision).await?;
        let owner = OwnerRef {
            kind: "ConfigMap".to_string(),
            name: marker.name.clone(),
            uid: marker.uid.clone().unwrap_or_default(),
        };

        for source in sources {
            self.copy_to_revision(source, revision, &owner).await?;
        }

        info!(
            namespace = %self.target_namespace,
            revision,
            "Created revision {}",
            revision
        );
        Ok(())
    }

    /// Read every tracked source, skipping absent optional ones
    async fn read_sources(&self) -> Result<Vec<StoredObject>, ReconcilerError> {
        let mut sources = Vec::new();
        for (kind, resource) in self.tracked() {
            match self
                .store
                .get(kind, &self.target_namespace, &resource.name)
                .await?
            {
                Some(source) => sources.push(source),
                None if resource.optional => {
                    debug!(kind = %kind, name = %resource.name, "Optional source absent, skipping");
                }
                None => {
                    return Err(ReconcilerError::NotFound {
                        kind,
                        name: resource.name.clone(),
                    })
                }
            }
        }
        Ok(sources)
    }

    /// Create the status marker of `revision`, or return the existing one
    async fn ensure_status_marker(&self, revision: i32) -> Result<StoredObject, ReconcilerError> {
        let name = status_marker_name(revision);
        let marker = StoredObject::new(
            self.target_namespace.clone(),
            name.clone(),
            Payload::text([
                ("status", STATUS_MARKER_IN_PROGRESS.to_string()),
                ("revision", revision.to_string()),
            ]),
        );

        match self.store.create(marker).await {
            Ok(created) => {
                debug!(marker = %created.name, "Created status marker");
                Ok(created)
            }
            Err(e) if e.is_already_exists() => self
                .store
                .get(ResourceKind::ConfigMap, &self.target_namespace, &name)
                .await?
                .ok_or(ReconcilerError::NotFound {
                    kind: ResourceKind::ConfigMap,
                    name,
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Copy one source object into its snapshot for `revision`
    async fn copy_to_revision(
        &self,
        source: StoredObject,
        revision: i32,
        owner: &OwnerRef,
    ) -> Result<(), ReconcilerError> {
        let kind = source.kind();
        let mut snapshot = StoredObject::new(
            self.target_namespace.clone(),
            name_for(&source.name, revision),
            source.payload,
        )
        .with_owner(owner.clone());
        snapshot.secret_type = source.secret_type;

        match self.store.create(snapshot).await {
            Ok(created) => {
                debug!(kind = %kind, name = %created.name, revision, "Created snapshot");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %kind, name = %source.name, revision, "Snapshot already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::controller::reconciler::testing::{Fixture, NAMESPACE};
    use crate::controller::reconciler::{ReconcilerError, TrackedResource};
    use crate::controller::store::{Payload, ResourceKind, StoredObject};

    fn fixture() -> Fixture {
        let fixture = Fixture::new(
            vec![
                TrackedResource::required("manifest"),
                TrackedResource::required("config"),
            ],
            vec![
                TrackedResource::required("serving-cert"),
                TrackedResource::optional("extra-cert"),
            ],
        );
        fixture.put_config_map("manifest", &[("pod.yaml", "v1")]);
        fixture.put_config_map("config", &[("config.yaml", "a: 1")]);
        fixture.put_secret("serving-cert", &[("tls.crt", b"cert")]);
        fixture
    }

    #[tokio::test]
    async fn test_creates_marker_and_snapshots() {
        let fixture = fixture();
        fixture.reconciler.create_revision(1).await.unwrap();

        let marker = fixture.config_map("revision-status-1").unwrap();
        assert_eq!(
            marker.payload,
            Payload::text([("status", "InProgress"), ("revision", "1")])
        );
        assert_eq!(
            fixture.config_map("manifest-1").unwrap().payload,
            Payload::text([("pod.yaml", "v1")])
        );
        assert_eq!(
            fixture.config_map("config-1").unwrap().payload,
            Payload::text([("config.yaml", "a: 1")])
        );
        assert_eq!(
            fixture.secret("serving-cert-1").unwrap().payload,
            Payload::binary([("tls.crt", b"cert".to_vec())])
        );
    }

    #[tokio::test]
    async fn test_snapshots_are_owned_by_marker() {
        let fixture = fixture();
        fixture.reconciler.create_revision(1).await.unwrap();

        let marker = fixture.config_map("revision-status-1").unwrap();
        let owner = fixture.secret("serving-cert-1").unwrap().owner.unwrap();
        assert_eq!(owner.kind, "ConfigMap");
        assert_eq!(owner.name, "revision-status-1");
        assert_eq!(Some(owner.uid), marker.uid);
        assert!(marker.owner.is_none());
    }

    #[tokio::test]
    async fn test_optional_absent_source_is_skipped() {
        let fixture = fixture();
        fixture.reconciler.create_revision(1).await.unwrap();
        assert!(fixture.secret("extra-cert-1").is_none());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let fixture = fixture();
        fixture.reconciler.create_revision(1).await.unwrap();
        let before: Vec<_> = ["manifest-1", "config-1", "revision-status-1"]
            .iter()
            .map(|name| fixture.config_map(name).unwrap())
            .collect();

        fixture.reconciler.create_revision(1).await.unwrap();
        let after: Vec<_> = ["manifest-1", "config-1", "revision-status-1"]
            .iter()
            .map(|name| fixture.config_map(name).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(
            fixture.store.names(ResourceKind::ConfigMap, NAMESPACE).len(),
            5
        );
    }

    #[tokio::test]
    async fn test_existing_snapshot_is_left_untouched() {
        let fixture = fixture();
        fixture.reconciler.create_revision(1).await.unwrap();
        fixture.put_config_map("manifest", &[("pod.yaml", "v2")]);

        fixture.reconciler.create_revision(1).await.unwrap();
        assert_eq!(
            fixture.config_map("manifest-1").unwrap().payload,
            Payload::text([("pod.yaml", "v1")])
        );
    }

    #[tokio::test]
    async fn test_rerun_completes_partial_revision() {
        let fixture = fixture();
        fixture.store.fail_creates(ResourceKind::ConfigMap, "config-1");

        let err = fixture.reconciler.create_revision(1).await.unwrap_err();
        assert!(matches!(err, ReconcilerError::Store(_)));
        assert!(fixture.config_map("manifest-1").is_some());
        assert!(fixture.config_map("config-1").is_none());
        assert!(fixture.secret("serving-cert-1").is_none());

        fixture.store.clear_failures();
        fixture.reconciler.create_revision(1).await.unwrap();
        assert!(fixture.config_map("config-1").is_some());
        assert!(fixture.secret("serving-cert-1").is_some());
    }

    #[tokio::test]
    async fn test_missing_required_source_creates_nothing() {
        let fixture = fixture();
        fixture
            .store
            .remove(ResourceKind::ConfigMap, NAMESPACE, "config");

        let err = fixture.reconciler.create_revision(2).await.unwrap_err();
        assert_eq!(err.to_string(), "configmaps \"config\" not found");
        assert!(fixture.config_map("revision-status-2").is_none());
        assert!(fixture.config_map("manifest-2").is_none());
        assert!(fixture.secret("serving-cert-2").is_none());
    }

    #[tokio::test]
    async fn test_secret_type_is_copied() {
        let fixture = fixture();
        fixture.store.put(
            StoredObject::new(
                NAMESPACE,
                "serving-cert",
                Payload::binary([("tls.crt", b"cert".to_vec())]),
            )
            .with_secret_type("kubernetes.io/tls"),
        );

        fixture.reconciler.create_revision(1).await.unwrap();
        assert_eq!(
            fixture.secret("serving-cert-1").unwrap().secret_type.as_deref(),
            Some("kubernetes.io/tls")
        );
    }

    #[tokio::test]
    async fn test_existing_marker_is_reused() {
        let fixture = fixture();
        fixture.put_config_map(
            "revision-status-3",
            &[("status", "InProgress"), ("revision", "3")],
        );
        let marker = fixture.config_map("revision-status-3").unwrap();

        fixture.reconciler.create_revision(3).await.unwrap();
        let owner = fixture.config_map("manifest-3").unwrap().owner.unwrap();
        assert_eq!(Some(owner.uid), marker.uid);
    }
}
