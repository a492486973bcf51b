//! # Controller Events
//!
//! Fire-and-forget notifications about revision creation.
//!
//! `KubeEventSink` publishes Kubernetes events against the RevisionOperator
//! object; publication runs on a spawned task so it never blocks a pass.

use crate::constants::EVENT_REPORTER;
use crate::crd::RevisionOperator;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Notification emitted by the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Drift was detected and a new revision will be created
    RevisionTriggered { revision: i32, reason: String },
    /// A new revision was created and the counter advanced
    RevisionCreated { revision: i32, reason: String },
    /// Creating a new revision failed
    RevisionCreateFailed { revision: i32, message: String },
}

impl ControllerEvent {
    pub fn reason(&self) -> &'static str {
        match self {
            ControllerEvent::RevisionTriggered { .. } => "RevisionTriggered",
            ControllerEvent::RevisionCreated { .. } => "RevisionCreate",
            ControllerEvent::RevisionCreateFailed { .. } => "RevisionCreateFailed",
        }
    }

    pub fn note(&self) -> String {
        match self {
            ControllerEvent::RevisionTriggered { revision, reason } => {
                format!("new revision {revision} triggered by {reason:?}")
            }
            ControllerEvent::RevisionCreated { revision, reason } => {
                format!("Revision {revision} created because {reason}")
            }
            ControllerEvent::RevisionCreateFailed { revision, message } => {
                format!("Failed to create revision {revision}: {message}")
            }
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, ControllerEvent::RevisionCreateFailed { .. })
    }
}

/// Sink for controller events
///
/// Implementations must not block; delivery is best effort.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ControllerEvent);
}

/// Publishes events to the Kubernetes API
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
    reference: ObjectReference,
}

impl std::fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventSink")
            .field("reference", &self.reference.name)
            .finish_non_exhaustive()
    }
}

impl KubeEventSink {
    /// Events are attached to the RevisionOperator named `operator_name`
    pub fn new(client: Client, operator_name: &str) -> Self {
        let reporter = Reporter {
            controller: EVENT_REPORTER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        let reference = ObjectReference {
            api_version: Some(RevisionOperator::api_version(&()).to_string()),
            kind: Some(RevisionOperator::kind(&()).to_string()),
            name: Some(operator_name.to_string()),
            ..ObjectReference::default()
        };
        Self {
            recorder: Recorder::new(client, reporter),
            reference,
        }
    }
}

impl EventSink for KubeEventSink {
    fn emit(&self, event: ControllerEvent) {
        let recorder = self.recorder.clone();
        let reference = self.reference.clone();
        let kube_event = Event {
            type_: if event.is_warning() {
                EventType::Warning
            } else {
                EventType::Normal
            },
            reason: event.reason().to_string(),
            note: Some(event.note()),
            action: "Reconcile".to_string(),
            secondary: None,
        };

        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&kube_event, &reference).await {
                warn!(reason = %kube_event.reason, error = %e, "Failed to publish event");
            }
        });
    }
}

/// Discards events after logging them at debug level
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, event: ControllerEvent) {
        debug!(reason = event.reason(), note = %event.note(), "event dropped");
    }
}

/// Collects events in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ControllerEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ControllerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of all recorded events, in order
    pub fn reasons(&self) -> Vec<&'static str> {
        self.events().iter().map(ControllerEvent::reason).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: ControllerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_reasons_and_types() {
        let triggered = ControllerEvent::RevisionTriggered {
            revision: 2,
            reason: "configmap/manifest has changed".to_string(),
        };
        assert_eq!(triggered.reason(), "RevisionTriggered");
        assert!(!triggered.is_warning());
        assert_eq!(
            triggered.note(),
            "new revision 2 triggered by \"configmap/manifest has changed\""
        );

        let failed = ControllerEvent::RevisionCreateFailed {
            revision: 2,
            message: "boom".to_string(),
        };
        assert!(failed.is_warning());
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.emit(ControllerEvent::RevisionTriggered {
            revision: 1,
            reason: String::new(),
        });
        sink.emit(ControllerEvent::RevisionCreated {
            revision: 1,
            reason: String::new(),
        });
        assert_eq!(sink.reasons(), vec!["RevisionTriggered", "RevisionCreate"]);
    }
}
