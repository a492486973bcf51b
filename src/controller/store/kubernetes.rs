//! # Kubernetes-backed Stores
//!
//! `ObjectStore` over core/v1 ConfigMaps and Secrets, and `RevisionStateClient`
//! over the `RevisionOperator` status subresource.

use super::error::api_error_code;
use super::{
    ObjectStore, OwnerRef, Payload, ResourceKind, RevisionState, RevisionStateClient, StoreError,
    StoredObject,
};
use crate::constants::{FIELD_MANAGER, STATUS_UPDATE_RETRIES};
use crate::controller::reconciler::status::set_condition;
use crate::crd::{Condition, RevisionOperator};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

/// Object store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredObject>, StoreError> {
        let object = match kind {
            ResourceKind::ConfigMap => self
                .config_maps(namespace)
                .get_opt(name)
                .await?
                .map(from_config_map),
            ResourceKind::Secret => self.secrets(namespace).get_opt(name).await?.map(from_secret),
        };
        Ok(object)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let params = ListParams::default();
        let objects = match kind {
            ResourceKind::ConfigMap => self
                .config_maps(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(from_config_map)
                .collect(),
            ResourceKind::Secret => self
                .secrets(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(from_secret)
                .collect(),
        };
        Ok(objects)
    }

    async fn create(&self, object: StoredObject) -> Result<StoredObject, StoreError> {
        let kind = object.kind();
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let result = match kind {
            ResourceKind::ConfigMap => self
                .config_maps(&object.namespace)
                .create(&params, &to_config_map(&object))
                .await
                .map(from_config_map),
            ResourceKind::Secret => self
                .secrets(&object.namespace)
                .create(&params, &to_secret(&object))
                .await
                .map(from_secret),
        };
        result.map_err(|e| create_error(kind, &object.name, e))
    }
}

/// Revision state client backed by the `RevisionOperator` custom resource
#[derive(Clone)]
pub struct KubeRevisionStateClient {
    api: Api<RevisionOperator>,
    name: String,
}

impl std::fmt::Debug for KubeRevisionStateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRevisionStateClient")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl KubeRevisionStateClient {
    pub fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            name: name.into(),
        }
    }

    fn resource_id(&self) -> String {
        format!("revisionoperators/{}", self.name)
    }

    /// Merge-patch the status subresource, guarded by `resource_version`
    ///
    /// The API server rejects the patch with 409 when the object moved on.
    async fn patch_status(
        &self,
        resource_version: &str,
        revision: i32,
        conditions: &[Condition],
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
            },
            "status": {
                "latestAvailableRevision": revision,
                "conditions": conditions,
            }
        });

        self.api
            .patch_status(
                &self.name,
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .map(|_| ())
            .map_err(|e| patch_error(self.resource_id(), e))
    }
}

#[async_trait]
impl RevisionStateClient for KubeRevisionStateClient {
    async fn get_latest_revision_state(&self) -> Result<RevisionState, StoreError> {
        let operator = self
            .api
            .get_opt(&self.name)
            .await?
            .ok_or_else(|| StoreError::StateNotFound {
                name: self.name.clone(),
            })?;
        Ok(revision_state_from(&operator))
    }

    async fn update_latest_revision(
        &self,
        expected_resource_version: &str,
        revision: i32,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError> {
        let current = self.get_latest_revision_state().await?;
        if current.resource_version != expected_resource_version {
            return Err(StoreError::Conflict {
                what: self.resource_id(),
                message: format!(
                    "resource version {} is stale, current is {}",
                    expected_resource_version, current.resource_version
                ),
            });
        }
        if revision < current.latest_available_revision {
            return Err(StoreError::Conflict {
                what: self.resource_id(),
                message: format!(
                    "latestAvailableRevision {} cannot move back to {}",
                    current.latest_available_revision, revision
                ),
            });
        }

        let mut conditions = current.conditions;
        let mut changed = current.latest_available_revision != revision;
        if let Some(condition) = condition {
            changed |= set_condition(&mut conditions, condition);
        }
        if !changed {
            debug!(
                "Skipping status update - latestAvailableRevision {} and conditions unchanged",
                revision
            );
            return Ok(false);
        }

        self.patch_status(expected_resource_version, revision, &conditions)
            .await?;
        Ok(true)
    }

    async fn update_condition(&self, condition: Condition) -> Result<bool, StoreError> {
        for attempt in 1..=STATUS_UPDATE_RETRIES {
            let current = self.get_latest_revision_state().await?;
            let mut conditions = current.conditions;
            if !set_condition(&mut conditions, condition.clone()) {
                debug!(
                    condition = %condition.r#type,
                    "Skipping status update - condition unchanged"
                );
                return Ok(false);
            }

            match self
                .patch_status(
                    &current.resource_version,
                    current.latest_available_revision,
                    &conditions,
                )
                .await
            {
                Ok(()) => return Ok(true),
                Err(StoreError::Conflict { .. }) => {
                    debug!(attempt, "Condition update conflicted, retrying from a fresh read");
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Conflict {
            what: self.resource_id(),
            message: format!("condition update still conflicting after {STATUS_UPDATE_RETRIES} attempts"),
        })
    }
}

/// 409 on create means the name is taken
fn create_error(kind: ResourceKind, name: &str, error: kube::Error) -> StoreError {
    match api_error_code(&error) {
        Some(409) => StoreError::AlreadyExists {
            kind,
            name: name.to_string(),
        },
        _ => StoreError::Kube(error),
    }
}

/// 409 on a status patch means the `resourceVersion` precondition failed
fn patch_error(what: String, error: kube::Error) -> StoreError {
    match api_error_code(&error) {
        Some(409) => StoreError::Conflict {
            what,
            message: error.to_string(),
        },
        _ => StoreError::Kube(error),
    }
}

fn revision_state_from(operator: &RevisionOperator) -> RevisionState {
    let status = operator.status.clone().unwrap_or_default();
    RevisionState {
        management_state: operator.spec.management_state,
        conditions: status.conditions,
        latest_available_revision: status.latest_available_revision,
        resource_version: operator.metadata.resource_version.clone().unwrap_or_default(),
    }
}

fn owner_from(meta: &ObjectMeta) -> Option<OwnerRef> {
    meta.owner_references
        .as_ref()
        .and_then(|refs| refs.first())
        .map(|owner| OwnerRef {
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            uid: owner.uid.clone(),
        })
}

fn meta_for(object: &StoredObject) -> ObjectMeta {
    ObjectMeta {
        name: Some(object.name.clone()),
        namespace: Some(object.namespace.clone()),
        owner_references: object.owner.as_ref().map(|owner| {
            vec![OwnerReference {
                api_version: "v1".to_string(),
                kind: owner.kind.clone(),
                name: owner.name.clone(),
                uid: owner.uid.clone(),
                ..OwnerReference::default()
            }]
        }),
        ..ObjectMeta::default()
    }
}

fn from_config_map(config_map: ConfigMap) -> StoredObject {
    let owner = owner_from(&config_map.metadata);
    let meta = config_map.metadata;
    StoredObject {
        namespace: meta.namespace.unwrap_or_default(),
        name: meta.name.unwrap_or_default(),
        uid: meta.uid,
        resource_version: meta.resource_version,
        payload: Payload::Text(config_map.data.unwrap_or_default()),
        secret_type: None,
        owner,
    }
}

fn from_secret(secret: Secret) -> StoredObject {
    let owner = owner_from(&secret.metadata);
    let meta = secret.metadata;
    let data = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, ByteString(value))| (key, value))
        .collect();
    StoredObject {
        namespace: meta.namespace.unwrap_or_default(),
        name: meta.name.unwrap_or_default(),
        uid: meta.uid,
        resource_version: meta.resource_version,
        payload: Payload::Binary(data),
        secret_type: secret.type_,
        owner,
    }
}

fn to_config_map(object: &StoredObject) -> ConfigMap {
    let data = match &object.payload {
        Payload::Text(data) => data.clone(),
        Payload::Binary(_) => Default::default(),
    };
    ConfigMap {
        metadata: meta_for(object),
        data: Some(data),
        ..ConfigMap::default()
    }
}

fn to_secret(object: &StoredObject) -> Secret {
    let data = match &object.payload {
        Payload::Binary(data) => data
            .iter()
            .map(|(key, value)| (key.clone(), ByteString(value.clone())))
            .collect(),
        Payload::Text(_) => Default::default(),
    };
    Secret {
        metadata: meta_for(object),
        data: Some(data),
        type_: object.secret_type.clone(),
        ..Secret::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Request, Response};
    use kube::client::Body;
    use std::collections::BTreeMap;

    #[test]
    fn test_config_map_conversion_keeps_owner_and_data() {
        let object = StoredObject::new("ns", "manifest-2", Payload::text([("pod.yaml", "spec")]))
            .with_owner(OwnerRef {
                kind: "ConfigMap".to_string(),
                name: "revision-status-2".to_string(),
                uid: "uid-2".to_string(),
            });

        let config_map = to_config_map(&object);
        let owners = config_map.metadata.owner_references.clone().unwrap();
        assert_eq!(owners[0].api_version, "v1");
        assert_eq!(owners[0].name, "revision-status-2");

        let back = from_config_map(config_map);
        assert_eq!(back.payload, object.payload);
        assert_eq!(back.owner, object.owner);
        assert_eq!(back.namespace, "ns");
    }

    #[test]
    fn test_secret_conversion_round_trips_bytes() {
        let object = StoredObject::new("ns", "cert-1", Payload::binary([("tls.crt", vec![0u8, 159, 146])]));
        let back = from_secret(to_secret(&object));
        assert_eq!(back.payload, object.payload);
        assert_eq!(back.owner, None);
    }

    #[test]
    fn test_missing_data_becomes_empty_payload() {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("empty".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        };
        assert_eq!(
            from_config_map(config_map).payload,
            Payload::Text(BTreeMap::new())
        );
    }

    #[test]
    fn test_secret_conversion_keeps_type() {
        let object = StoredObject::new("ns", "cert-1", Payload::binary([("tls.crt", b"pem".to_vec())]))
            .with_secret_type("kubernetes.io/tls");
        let secret = to_secret(&object);
        assert_eq!(secret.type_.as_deref(), Some("kubernetes.io/tls"));
        assert_eq!(from_secret(secret).secret_type, object.secret_type);
    }

    type ApiHandle = tower_test::mock::Handle<Request<Body>, Response<Body>>;

    fn mock_client() -> (Client, ApiHandle) {
        let (service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(service, "ns"), handle)
    }

    /// Answer the next request with a Kubernetes `Status` failure
    async fn respond_with_status(handle: &mut ApiHandle, code: u16, reason: &str) -> Request<Body> {
        let (request, send) = handle.next_request().await.expect("no request sent");
        let status = serde_json::json!({
            "kind": "Status",
            "apiVersion": "v1",
            "metadata": {},
            "status": "Failure",
            "message": format!("{reason} from mock API server"),
            "reason": reason,
            "code": code,
        });
        send.send_response(
            Response::builder()
                .status(code)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&status).unwrap()))
                .unwrap(),
        );
        request
    }

    #[tokio::test]
    async fn test_create_maps_409_to_already_exists() {
        let (client, mut handle) = mock_client();
        let store = KubeObjectStore::new(client);
        let server = tokio::spawn(async move {
            let request = respond_with_status(&mut handle, 409, "AlreadyExists").await;
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.uri().path(), "/api/v1/namespaces/ns/configmaps");
        });

        let err = store
            .create(StoredObject::new("ns", "manifest-1", Payload::text([("pod.yaml", "v1")])))
            .await
            .unwrap_err();
        server.await.unwrap();
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "configmaps \"manifest-1\" already exists");
    }

    #[tokio::test]
    async fn test_create_keeps_other_api_errors() {
        let (client, mut handle) = mock_client();
        let store = KubeObjectStore::new(client);
        let server = tokio::spawn(async move {
            let request = respond_with_status(&mut handle, 403, "Forbidden").await;
            assert_eq!(request.uri().path(), "/api/v1/namespaces/ns/secrets");
        });

        let err = store
            .create(StoredObject::new("ns", "cert-1", Payload::binary([("tls.crt", b"pem".to_vec())])))
            .await
            .unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, StoreError::Kube(_)));
        assert!(!err.is_already_exists());
    }

    #[tokio::test]
    async fn test_status_patch_maps_409_to_conflict() {
        let (client, mut handle) = mock_client();
        let state = KubeRevisionStateClient::new(client, "cluster");
        let server = tokio::spawn(async move {
            let request = respond_with_status(&mut handle, 409, "Conflict").await;
            assert_eq!(request.method(), Method::PATCH);
            assert_eq!(
                request.uri().path(),
                "/apis/revision.microscaler.io/v1/revisionoperators/cluster/status"
            );
        });

        let err = state.patch_status("41", 3, &[]).await.unwrap_err();
        server.await.unwrap();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("revisionoperators/cluster"));
    }

    #[tokio::test]
    async fn test_status_patch_keeps_other_api_errors() {
        let (client, mut handle) = mock_client();
        let state = KubeRevisionStateClient::new(client, "cluster");
        let server = tokio::spawn(async move {
            respond_with_status(&mut handle, 500, "InternalError").await;
        });

        let err = state.patch_status("41", 3, &[]).await.unwrap_err();
        server.await.unwrap();
        assert!(matches!(err, StoreError::Kube(_)));
    }
}
