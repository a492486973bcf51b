//! # Object Store
//!
//! Capability traits through which the reconciler reads and writes Kubernetes
//! state, plus the store-neutral object model they exchange.
//!
//! ## Module Structure
//!
//! - `error.rs` - Store error taxonomy
//! - `kubernetes.rs` - Implementations backed by the Kubernetes API
//! - `memory.rs` - In-memory implementation backing the reconciler tests

mod error;
mod kubernetes;
mod memory;

pub use error::StoreError;
pub use kubernetes::{KubeObjectStore, KubeRevisionStateClient};
pub use memory::MemoryStore;

use crate::crd::{Condition, ManagementState};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The two kinds of source object a revision snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    /// Generic text payloads
    ConfigMap,
    /// Secret-like binary payloads
    Secret,
}

impl ResourceKind {
    /// Lowercase singular form, as used in change reasons (`configmap/manifest`)
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "configmap",
            ResourceKind::Secret => "secret",
        }
    }

    /// API resource name, as used in not-found messages (`configmaps "manifest"`)
    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::ConfigMap => "configmaps",
            ResourceKind::Secret => "secrets",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by a ConfigMap or Secret
///
/// A missing data map is represented as an empty one, so absent and empty
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(BTreeMap<String, String>),
    Binary(BTreeMap<String, Vec<u8>>),
}

impl Payload {
    /// Empty payload of the given kind
    pub fn empty(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::ConfigMap => Payload::Text(BTreeMap::new()),
            ResourceKind::Secret => Payload::Binary(BTreeMap::new()),
        }
    }

    /// Build a text payload from key/value pairs
    pub fn text<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Text(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a binary payload from key/value pairs
    pub fn binary<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Vec<u8>>,
    {
        Payload::Binary(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Payload::Text(_) => ResourceKind::ConfigMap,
            Payload::Binary(_) => ResourceKind::Secret,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(data) => data.len(),
            Payload::Binary(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of a text entry; `None` for binary payloads
    pub fn text_value(&self, key: &str) -> Option<&str> {
        match self {
            Payload::Text(data) => data.get(key).map(String::as_str),
            Payload::Binary(_) => None,
        }
    }

    /// Keys whose presence or value differs between the two payloads
    ///
    /// Only key names are reported so the result is safe to log for Secrets.
    pub fn changed_keys(&self, other: &Payload) -> Vec<String> {
        match (self, other) {
            (Payload::Text(a), Payload::Text(b)) => diff_keys(a, b),
            (Payload::Binary(a), Payload::Binary(b)) => diff_keys(a, b),
            (a, b) => {
                let mut keys: BTreeSet<String> = a.keys().into_iter().collect();
                keys.extend(b.keys());
                keys.into_iter().collect()
            }
        }
    }

    fn keys(&self) -> Vec<String> {
        match self {
            Payload::Text(data) => data.keys().cloned().collect(),
            Payload::Binary(data) => data.keys().cloned().collect(),
        }
    }
}

fn diff_keys<V: PartialEq>(a: &BTreeMap<String, V>, b: &BTreeMap<String, V>) -> Vec<String> {
    a.keys()
        .chain(b.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|key| a.get(*key) != b.get(*key))
        .cloned()
        .collect()
}

/// Back-reference from a snapshot object to the status marker that owns it
///
/// Only consumed by the external garbage collector; never traversed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    pub uid: String,
}

/// Store-neutral view of a ConfigMap or Secret
///
/// Carries the fields a snapshot reproduces: the data map, the Secret type
/// and the owner. Labels, annotations and ConfigMap `binaryData` are not
/// part of the view and are not copied into revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub namespace: String,
    pub name: String,
    /// Assigned by the store on create
    pub uid: Option<String>,
    /// Opaque version token assigned by the store
    pub resource_version: Option<String>,
    pub payload: Payload,
    /// Secret `type` (`kubernetes.io/tls`, ...); `None` for ConfigMaps and
    /// untyped Secrets
    pub secret_type: Option<String>,
    pub owner: Option<OwnerRef>,
}

impl StoredObject {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, payload: Payload) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: None,
            resource_version: None,
            payload,
            secret_type: None,
            owner: None,
        }
    }

    #[must_use]
    pub fn with_secret_type(mut self, secret_type: impl Into<String>) -> Self {
        self.secret_type = Some(secret_type.into());
        self
    }

    #[must_use]
    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.payload.kind()
    }
}

/// Authoritative revision state read from the owning resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionState {
    pub management_state: ManagementState,
    pub conditions: Vec<Condition>,
    pub latest_available_revision: i32,
    /// Version token to present on conditional writes
    pub resource_version: String,
}

/// Read/create access to ConfigMaps and Secrets
///
/// `get` distinguishes "not found" (`Ok(None)`) from other failures (`Err`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<StoredObject>, StoreError>;

    async fn list(&self, kind: ResourceKind, namespace: &str)
        -> Result<Vec<StoredObject>, StoreError>;

    /// Create the object; the kind follows from its payload.
    ///
    /// Returns `StoreError::AlreadyExists` when the name is taken.
    async fn create(&self, object: StoredObject) -> Result<StoredObject, StoreError>;
}

/// Access to the authoritative revision state with optimistic concurrency
#[async_trait]
pub trait RevisionStateClient: Send + Sync {
    async fn get_latest_revision_state(&self) -> Result<RevisionState, StoreError>;

    /// Set `latestAvailableRevision` (and optionally one condition), only if the
    /// state still carries `expected_resource_version`.
    ///
    /// Fails with `StoreError::Conflict` when the version is stale or the write
    /// would move the counter backwards. Returns whether anything changed.
    async fn update_latest_revision(
        &self,
        expected_resource_version: &str,
        revision: i32,
        condition: Option<Condition>,
    ) -> Result<bool, StoreError>;

    /// Set one condition on a freshly read state, retrying on conflicts.
    ///
    /// Returns whether anything changed; unchanged conditions are not written.
    async fn update_condition(&self, condition: Condition) -> Result<bool, StoreError>;
}
