//! Fixtures shared by the reconciler unit tests.

use super::{Reconciler, TrackedResource};
use crate::controller::events::RecordingEventSink;
use crate::controller::store::{MemoryStore, Payload, ResourceKind, StoredObject};
use std::sync::Arc;

pub(crate) const NAMESPACE: &str = "test-ns";

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub events: Arc<RecordingEventSink>,
    pub reconciler: Reconciler,
}

impl Fixture {
    pub fn new(config_maps: Vec<TrackedResource>, secrets: Vec<TrackedResource>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventSink::new());
        let reconciler = Reconciler::new(
            NAMESPACE,
            config_maps,
            secrets,
            store.clone(),
            store.clone(),
            events.clone(),
        );
        Self {
            store,
            events,
            reconciler,
        }
    }

    pub fn put_config_map(&self, name: &str, entries: &[(&str, &str)]) {
        self.store.put(StoredObject::new(
            NAMESPACE,
            name,
            Payload::text(entries.iter().copied()),
        ));
    }

    pub fn put_secret(&self, name: &str, entries: &[(&str, &[u8])]) {
        self.store.put(StoredObject::new(
            NAMESPACE,
            name,
            Payload::binary(entries.iter().map(|(k, v)| (*k, v.to_vec()))),
        ));
    }

    pub fn config_map(&self, name: &str) -> Option<StoredObject> {
        self.store.object(ResourceKind::ConfigMap, NAMESPACE, name)
    }

    pub fn secret(&self, name: &str) -> Option<StoredObject> {
        self.store.object(ResourceKind::Secret, NAMESPACE, name)
    }
}
