//! # Sync Pass
//!
//! Brings the revision history up to date with the tracked sources.
//!
//! A pass reads the revision state, recovers the counter when it was lost,
//! creates a new revision on drift and finally records the outcome in the
//! `RevisionControllerDegraded` condition.

use crate::controller::events::ControllerEvent;
use crate::controller::reconciler::status::degraded_condition;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::store::RevisionState;
use crate::observability;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Result of a pass that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing left to do until the next change
    Completed,
    /// State moved underneath the pass; run again after the requeue delay.
    /// Not a failure and never recorded as a condition.
    RetryRequested { reason: String },
}

impl Reconciler {
    /// Run one reconciliation pass
    pub async fn sync(&self) -> Result<PassOutcome, ReconcilerError> {
        let span = tracing::info_span!(
            "controller.reconcile.pass",
            namespace = %self.target_namespace
        );
        let start = Instant::now();
        observability::metrics::increment_reconciliations();

        let result = self.sync_inner().instrument(span).await;

        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        result
    }

    async fn sync_inner(&self) -> Result<PassOutcome, ReconcilerError> {
        let state = self.state.get_latest_revision_state().await?;
        if !state.management_state.is_managed() {
            debug!(
                management_state = ?state.management_state,
                "Not managed, skipping reconciliation"
            );
            return Ok(PassOutcome::Completed);
        }

        if state.latest_available_revision == 0 {
            if let Some(outcome) = self.restore_latest_revision(&state).await? {
                return Ok(outcome);
            }
        }

        let result = self.create_revision_if_needed(&state).await;
        self.finalize(result).await
    }

    /// Write back the counter recovered from status markers
    ///
    /// Returns `None` when there was nothing to recover and the pass should
    /// carry on from revision 0.
    async fn restore_latest_revision(
        &self,
        state: &RevisionState,
    ) -> Result<Option<PassOutcome>, ReconcilerError> {
        let recovered = self.recover_latest_revision().await?;
        if recovered == 0 {
            return Ok(None);
        }

        match self
            .state
            .update_latest_revision(&state.resource_version, recovered, None)
            .await
        {
            Ok(_) => {
                info!(revision = recovered, "Recovered latest available revision");
                observability::metrics::set_latest_revision(recovered);
            }
            Err(e) if e.is_conflict() => {
                debug!(revision = recovered, error = %e, "Recovered revision lost a write race");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(PassOutcome::RetryRequested {
            reason: format!("recovered latest revision {recovered}"),
        }))
    }

    /// Create the next revision when the latest one no longer matches its sources
    async fn create_revision_if_needed(
        &self,
        state: &RevisionState,
    ) -> Result<PassOutcome, ReconcilerError> {
        let latest = state.latest_available_revision;
        let check = self.is_current(latest).await;
        if check.current {
            debug!(revision = latest, "Latest revision is current");
            return Ok(PassOutcome::Completed);
        }

        let next = latest
            .checked_add(1)
            .ok_or(ReconcilerError::RevisionOverflow(latest))?;
        info!(
            revision = next,
            reason = %check.reason,
            "🔄 New revision {} triggered by {:?}",
            next,
            check.reason
        );
        self.events.emit(ControllerEvent::RevisionTriggered {
            revision: next,
            reason: check.reason.clone(),
        });

        if let Err(e) = self.create_revision(next).await {
            self.events.emit(ControllerEvent::RevisionCreateFailed {
                revision: next,
                message: e.to_string(),
            });
            return Err(ReconcilerError::ContentCreation {
                revision: next,
                source: Box::new(e),
            });
        }

        match self
            .state
            .update_latest_revision(&state.resource_version, next, Some(degraded_condition(None)))
            .await
        {
            Ok(updated) => {
                if updated {
                    self.events.emit(ControllerEvent::RevisionCreated {
                        revision: next,
                        reason: check.reason,
                    });
                }
                observability::metrics::increment_revisions_created();
                observability::metrics::set_latest_revision(next);
                info!(revision = next, "✅ Revision {} is now the latest", next);
                Ok(PassOutcome::Completed)
            }
            Err(e) if e.is_conflict() => {
                debug!(revision = next, error = %e, "Revision state changed while creating revision");
                Ok(PassOutcome::RetryRequested {
                    reason: format!("revision state changed while creating revision {next}"),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record the outcome of the pass in the degraded condition
    async fn finalize(
        &self,
        result: Result<PassOutcome, ReconcilerError>,
    ) -> Result<PassOutcome, ReconcilerError> {
        if let Ok(PassOutcome::RetryRequested { .. }) = result {
            return result;
        }

        let condition = degraded_condition(result.as_ref().err());
        match self.state.update_condition(condition).await {
            Ok(_) => result,
            Err(update_error) => match result {
                Ok(_) => Err(ReconcilerError::StatusUpdate(update_error)),
                Err(e) => {
                    warn!(
                        error = %update_error,
                        "Failed to record degraded condition for failed pass"
                    );
                    Err(e)
                }
            },
        }
    }
}
