//! # Error Policy
//!
//! Requeue decisions for failed passes and logging for watch stream errors.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::ReconcilerError;
use crate::observability;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Log a failed pass and return the delay before it is re-run
pub fn handle_pass_error(error: &ReconcilerError, backoff: &mut ExponentialBackoff) -> Duration {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconcile.error",
        error.kind = error.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation failed: {}", error);
    observability::metrics::increment_reconciliation_errors(error.as_str());

    let delay = backoff.next_backoff();
    info!(
        "🔄 Retrying in {:?} (consecutive failures: {}, trigger source: error-backoff)",
        delay,
        backoff.failures()
    );
    observability::metrics::increment_requeues_total("error-backoff");
    delay
}

/// Return the delay before a retry-requested pass is re-run
///
/// Not an error: nothing is logged above debug level.
pub fn handle_retry_requested(reason: &str, backoff: &mut ExponentialBackoff) -> Duration {
    let delay = backoff.next_backoff();
    debug!(reason, ?delay, "Pass requested a retry");
    observability::metrics::increment_requeues_total("retry-requested");
    delay
}

/// Broad class of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old; the watcher relists
    Expired,
    /// API server throttling or storage reinitializing
    TooManyRequests,
    /// Watched resource type or object not found
    NotFound,
    Other,
}

/// Classify a watch error from its rendered message
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::TooManyRequests
    } else if error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error
///
/// The watcher restarts itself with its own backoff; nothing else to do here.
pub fn handle_watch_error(resource: &str, error: &kube_runtime::watcher::Error) {
    let error_string = error.to_string();
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(&error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "❌ Watch on {} failed with 401 Unauthorized, check the controller's RBAC bindings",
                resource
            );
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "Watch on {} expired, relisting", resource);
        }
        WatchErrorKind::TooManyRequests => {
            warn!(error_type = "429", "API server throttling watch on {}, backing off", resource);
        }
        WatchErrorKind::NotFound => {
            warn!("Watch on {} reported not found: {}", resource, error_string);
        }
        WatchErrorKind::Other => {
            error!("Watch stream error on {}: {}", resource, error_string);
        }
    }
}
