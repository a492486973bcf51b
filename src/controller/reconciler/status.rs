//! # Status Management
//!
//! Builds and merges the `RevisionControllerDegraded` condition.

use crate::constants::DEGRADED_CONDITION_TYPE;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::Condition;

/// Degraded condition for the outcome of a pass
///
/// `True` with the error's reason and message when the pass failed, `False`
/// otherwise.
pub fn degraded_condition(error: Option<&ReconcilerError>) -> Condition {
    let now = Some(chrono::Utc::now().to_rfc3339());
    match error {
        Some(error) => Condition {
            r#type: DEGRADED_CONDITION_TYPE.to_string(),
            status: "True".to_string(),
            last_transition_time: now,
            reason: Some(error.condition_reason().to_string()),
            message: Some(error.to_string()),
        },
        None => Condition {
            r#type: DEGRADED_CONDITION_TYPE.to_string(),
            status: "False".to_string(),
            last_transition_time: now,
            reason: None,
            message: None,
        },
    }
}

/// Merge `condition` into `conditions`, replacing any of the same type
///
/// Returns false when an equal condition is already present, so callers can
/// skip the write and avoid waking every watcher. The transition time only
/// moves when the status flips.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> bool {
    match conditions
        .iter_mut()
        .find(|existing| existing.r#type == condition.r#type)
    {
        Some(existing) => {
            if existing.status == condition.status
                && existing.reason == condition.reason
                && existing.message == condition.message
            {
                return false;
            }
            if existing.status == condition.status {
                condition
                    .last_transition_time
                    .clone_from(&existing.last_transition_time);
            }
            *existing = condition;
            true
        }
        None => {
            conditions.push(condition);
            true
        }
    }
}
