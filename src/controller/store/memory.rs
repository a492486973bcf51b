//! # In-memory Store
//!
//! `ObjectStore` and `RevisionStateClient` held in process memory.
//!
//! Mirrors the API server semantics the reconciler relies on: create fails on
//! existing names, every write bumps a resource version, and version-checked
//! status writes fail with a conflict when stale. Failure injection hooks
//! (unit tests or the `testing` feature) simulate transient read errors,
//! failed creates and lost races.

use super::{
    ObjectStore, ResourceKind, RevisionState, RevisionStateClient, StoreError,
    StoredObject,
};
use crate::controller::reconciler::status::set_condition;
use crate::crd::{Condition, ManagementState};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

type ObjectKey = (ResourceKind, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<ObjectKey, StoredObject>,
    next_resource_version: u64,
    management_state: ManagementState,
    conditions: Vec<Condition>,
    latest_available_revision: i32,
    state_resource_version: u64,
    status_writes: usize,
    failing_gets: HashSet<(ResourceKind, String)>,
    failing_creates: HashSet<(ResourceKind, String)>,
    fail_condition_updates: bool,
    conflict_next_revision_update: bool,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn bump_state(&mut self) {
        self.state_resource_version = self.next_resource_version + 1;
        self.next_resource_version = self.state_resource_version;
    }

    fn snapshot(&self) -> RevisionState {
        RevisionState {
            management_state: self.management_state,
            conditions: self.conditions.clone(),
            latest_available_revision: self.latest_available_revision,
            resource_version: self.state_resource_version.to_string(),
        }
    }
}

/// In-memory object store and revision state
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create or overwrite an object, as an external actor would
    pub fn put(&self, mut object: StoredObject) {
        let mut state = self.lock();
        let key = (object.kind(), object.namespace.clone(), object.name.clone());
        if object.uid.is_none() {
            object.uid = state
                .objects
                .get(&key)
                .and_then(|existing| existing.uid.clone())
                .or_else(|| Some(uuid::Uuid::new_v4().to_string()));
        }
        object.resource_version = Some(state.bump());
        state.objects.insert(key, object);
    }

    /// Delete an object, as an external actor would
    pub fn remove(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
    }

    /// Current copy of an object, bypassing failure injection
    pub fn object(&self, kind: ResourceKind, namespace: &str, name: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Names of all objects of a kind in a namespace, sorted
    pub fn names(&self, kind: ResourceKind, namespace: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(k, ns, _)| *k == kind && ns == namespace)
            .map(|(_, _, name)| name.clone())
            .collect()
    }

    pub fn set_management_state(&self, management_state: ManagementState) {
        let mut state = self.lock();
        state.management_state = management_state;
        state.bump_state();
    }

    /// Overwrite the revision counter, as an external writer would
    pub fn set_latest_available_revision(&self, revision: i32) {
        let mut state = self.lock();
        state.latest_available_revision = revision;
        state.bump_state();
    }

    pub fn revision_state(&self) -> RevisionState {
        self.lock().snapshot()
    }

    pub fn condition(&self, condition_type: &str) -> Option<Condition> {
        self.lock()
            .conditions
            .iter()
            .find(|c| c.r#type == condition_type)
            .cloned()
    }

    /// Number of status writes that changed the revision state
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }

    /// Make reads of this object fail with a non-"not found" error
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_gets(&self, kind: ResourceKind, name: &str) {
        self.lock().failing_gets.insert((kind, name.to_string()));
    }

    /// Make creates of this object fail with a non-"already exists" error
    #[cfg(any(test, feature = "testing"))]
    pub fn fail_creates(&self, kind: ResourceKind, name: &str) {
        self.lock().failing_creates.insert((kind, name.to_string()));
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn fail_condition_updates(&self, fail: bool) {
        self.lock().fail_condition_updates = fail;
    }

    /// Simulate a concurrent writer landing between the next read and the
    /// next version-checked revision update
    #[cfg(any(test, feature = "testing"))]
    pub fn conflict_next_revision_update(&self) {
        self.lock().conflict_next_revision_update = true;
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_gets.clear();
        state.failing_creates.clear();
        state.fail_condition_updates = false;
        state.conflict_next_revision_update = false;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredObject>, StoreError> {
        let state = self.lock();
        if state.failing_gets.contains(&(kind, name.to_string())) {
            return Err(StoreError::Backend(format!(
                "injected read failure for {kind}/{name}"
            )));
        }
        Ok(state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> Result<Vec<StoredObject>, StoreError> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn create(&self, mut object: StoredObject) -> Result<StoredObject, StoreError> {
        let kind = object.kind();
        let mut state = self.lock();
        if state.failing_creates.contains(&(kind, object.name.clone())) {
            return Err(StoreError::Backend(format!(
                "injected create failure for {kind}/{}",
                object.name
            )));
        }
        let key = (kind, object.namespace.clone(), object.name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind,
                name: object.name,
            });
        }
        object.uid = Some(uuid::Uuid::new_v4().to_string());
        object.resource_version = Some(state.bump());
        state.objects.insert(key, object.clone());
        Ok(object)
    }
}

#[async_trait]
impl RevisionStateClient for MemoryStore {
    async fn get_latest_revision_state(&self) -> Result<RevisionState, StoreError> {
        Ok(self.lock().snapshot())
    }

    async fn update_latest_revision(
        &self,
        expected_resource_version: &str,
        revision: i32,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.conflict_next_revision_update {
            state.conflict_next_revision_update = false;
            state.bump_state();
        }
        if state.state_resource_version.to_string() != expected_resource_version {
            return Err(StoreError::Conflict {
                what: "revision state".to_string(),
                message: format!(
                    "resource version {expected_resource_version} is stale, current is {}",
                    state.state_resource_version
                ),
            });
        }
        if revision < state.latest_available_revision {
            return Err(StoreError::Conflict {
                what: "revision state".to_string(),
                message: format!(
                    "latestAvailableRevision {} cannot move back to {revision}",
                    state.latest_available_revision
                ),
            });
        }

        let mut changed = state.latest_available_revision != revision;
        state.latest_available_revision = revision;
        if let Some(condition) = condition {
            changed |= set_condition(&mut state.conditions, condition);
        }
        if changed {
            state.bump_state();
            state.status_writes += 1;
        }
        Ok(changed)
    }

    async fn update_condition(&self, condition: Condition) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.fail_condition_updates {
            return Err(StoreError::Backend(
                "injected condition update failure".to_string(),
            ));
        }
        let changed = set_condition(&mut state.conditions, condition);
        if changed {
            state.bump_state();
            state.status_writes += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::Payload;

    #[tokio::test]
    async fn test_create_rejects_existing_name() {
        let store = MemoryStore::new();
        let object = StoredObject::new("ns", "a", Payload::text([("k", "v")]));
        store.create(object.clone()).await.unwrap();
        let err = store.create(object).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_create_assigns_uid_and_version() {
        let store = MemoryStore::new();
        let created = store
            .create(StoredObject::new("ns", "a", Payload::text([("k", "v")])))
            .await
            .unwrap();
        assert!(created.uid.is_some());
        assert!(created.resource_version.is_some());
    }

    #[tokio::test]
    async fn test_get_distinguishes_missing_from_failure() {
        let store = MemoryStore::new();
        assert!(store
            .get(ResourceKind::ConfigMap, "ns", "missing")
            .await
            .unwrap()
            .is_none());

        store.fail_gets(ResourceKind::ConfigMap, "broken");
        assert!(store
            .get(ResourceKind::ConfigMap, "ns", "broken")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_is_scoped_by_kind_and_namespace() {
        let store = MemoryStore::new();
        store.put(StoredObject::new("ns", "a", Payload::text([("k", "v")])));
        store.put(StoredObject::new("ns", "b", Payload::binary([("k", b"v".to_vec())])));
        store.put(StoredObject::new("other", "c", Payload::text([("k", "v")])));

        let config_maps = store.list(ResourceKind::ConfigMap, "ns").await.unwrap();
        assert_eq!(config_maps.len(), 1);
        assert_eq!(config_maps[0].name, "a");
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let store = MemoryStore::new();
        let read = store.get_latest_revision_state().await.unwrap();
        store.set_latest_available_revision(3);

        let err = store
            .update_latest_revision(&read.resource_version, 4, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.revision_state().latest_available_revision, 3);
    }

    #[tokio::test]
    async fn test_counter_cannot_move_backwards() {
        let store = MemoryStore::new();
        store.set_latest_available_revision(5);
        let read = store.get_latest_revision_state().await.unwrap();
        let err = store
            .update_latest_revision(&read.resource_version, 4, None)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_unchanged_condition_is_not_written() {
        let store = MemoryStore::new();
        let condition = Condition {
            r#type: "RevisionControllerDegraded".to_string(),
            status: "False".to_string(),
            last_transition_time: None,
            reason: None,
            message: None,
        };
        assert!(store.update_condition(condition.clone()).await.unwrap());
        assert!(!store.update_condition(condition).await.unwrap());
        assert_eq!(store.status_writes(), 1);
    }
}
