//! # Naming
//!
//! Names of the objects that make up a revision.

use crate::constants::STATUS_MARKER_PREFIX;

/// Name of the snapshot of `name` at `revision` (`<name>-<revision>`)
pub fn name_for(name: &str, revision: i32) -> String {
    format!("{name}-{revision}")
}

/// Name of the status marker anchoring `revision`
pub fn status_marker_name(revision: i32) -> String {
    name_for(STATUS_MARKER_PREFIX, revision)
}

/// Whether `name` looks like a status marker
pub fn is_status_marker(name: &str) -> bool {
    name.strip_prefix(STATUS_MARKER_PREFIX)
        .is_some_and(|rest| rest.starts_with('-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_for() {
        assert_eq!(name_for("manifest", 1), "manifest-1");
        assert_eq!(name_for("kube-apiserver-pod", 42), "kube-apiserver-pod-42");
    }

    #[test]
    fn test_status_marker_name() {
        assert_eq!(status_marker_name(3), "revision-status-3");
    }

    #[test]
    fn test_is_status_marker() {
        assert!(is_status_marker("revision-status-1"));
        assert!(is_status_marker("revision-status-"));
        assert!(!is_status_marker("revision-statusx-1"));
        assert!(!is_status_marker("manifest-1"));
    }
}
