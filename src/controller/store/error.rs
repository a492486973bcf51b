//! # Store Error Types
//!
//! Failures surfaced by `ObjectStore` and `RevisionStateClient` implementations.

use super::ResourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Create hit an existing object with the same name
    #[error("{} \"{}\" already exists", .kind.plural(), .name)]
    AlreadyExists { kind: ResourceKind, name: String },

    /// Version-checked write lost against a concurrent writer
    #[error("conflict updating {what}: {message}")]
    Conflict { what: String, message: String },

    /// The resource holding the revision state does not exist
    #[error("revisionoperators \"{name}\" not found")]
    StateNotFound { name: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Failure reported by a non-Kubernetes backend
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// HTTP status code carried by a Kubernetes API error, if any
pub(crate) fn api_error_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_message_matches_api_wording() {
        let err = StoreError::AlreadyExists {
            kind: ResourceKind::ConfigMap,
            name: "manifest-3".to_string(),
        };
        assert_eq!(err.to_string(), "configmaps \"manifest-3\" already exists");
        assert!(err.is_already_exists());
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_conflict_classification() {
        let err = StoreError::Conflict {
            what: "revisionoperators/cluster".to_string(),
            message: "resource version changed".to_string(),
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("revisionoperators/cluster"));
    }
}
