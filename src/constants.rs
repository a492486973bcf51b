//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Default port for the metrics and probe HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind during startup (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// How often to poll the HTTP server readiness flag during startup (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Namespace holding the tracked ConfigMaps and Secrets when none is configured
pub const DEFAULT_TARGET_NAMESPACE: &str = "default";

/// Name of the singleton RevisionOperator resource when none is configured
pub const DEFAULT_OPERATOR_RESOURCE_NAME: &str = "cluster";

/// First retry delay after a failed pass (milliseconds)
pub const DEFAULT_REQUEUE_BASE_DELAY_MS: u64 = 5;

/// Upper bound for the retry delay after repeated failed passes (seconds)
pub const DEFAULT_REQUEUE_MAX_DELAY_SECS: u64 = 1000;

/// Configured worker count. Only one worker ever runs.
pub const DEFAULT_WORKERS: usize = 1;

/// Attempts made by a condition write before giving up on version conflicts
pub const STATUS_UPDATE_RETRIES: usize = 5;

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "revision-controller";

/// Reporter name attached to emitted Kubernetes events
pub const EVENT_REPORTER: &str = "revision-controller";

/// The single condition type owned by this controller
pub const DEGRADED_CONDITION_TYPE: &str = "RevisionControllerDegraded";

/// Name prefix of the per-revision status marker ConfigMaps
pub const STATUS_MARKER_PREFIX: &str = "revision-status";

/// Value of the `status` entry written into new status markers
pub const STATUS_MARKER_IN_PROGRESS: &str = "InProgress";

/// Number of watch streams that must list before the worker starts
/// (RevisionOperator, ConfigMaps, Secrets)
pub const WATCHED_RESOURCE_COUNT: usize = 3;
