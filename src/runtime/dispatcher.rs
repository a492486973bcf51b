//! # Dispatcher
//!
//! Single-slot work queue and the one worker draining it.
//!
//! Every watch notification calls [`Trigger::enqueue`]. Notifications arriving
//! while a pass is pending or running collapse into one pending pass, so a
//! burst of changes costs at most one extra pass. Failed and retry-requested
//! passes are re-run after an exponential delay; a trigger during that delay
//! runs the pass right away.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::{PassOutcome, Reconciler, ReconcilerError};
use crate::observability;
use crate::runtime::error_policy::{handle_pass_error, handle_retry_requested};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Handle used by watchers to request a pass
#[derive(Debug, Clone, Default)]
pub struct Trigger {
    notify: Arc<Notify>,
}

impl Trigger {
    /// Mark the work item pending; idempotent until the worker picks it up
    pub fn enqueue(&self) {
        observability::metrics::increment_triggers();
        self.notify.notify_one();
    }

    async fn pending(&self) {
        self.notify.notified().await;
    }
}

/// Something the worker can run one pass of
#[async_trait]
pub trait PassRunner: Send + Sync + 'static {
    async fn run_pass(&self) -> Result<PassOutcome, ReconcilerError>;
}

#[async_trait]
impl PassRunner for Reconciler {
    async fn run_pass(&self) -> Result<PassOutcome, ReconcilerError> {
        self.sync().await
    }
}

#[derive(Debug)]
pub struct Dispatcher {
    trigger: Trigger,
    backoff: ExponentialBackoff,
}

impl Dispatcher {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            trigger: Trigger::default(),
            backoff,
        }
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger.clone()
    }

    /// Run passes until `shutdown` turns true or its sender goes away
    ///
    /// Shutdown is observed between passes only; a running pass always
    /// finishes.
    pub async fn run<R: PassRunner>(mut self, runner: Arc<R>, mut shutdown: watch::Receiver<bool>) {
        info!("Worker started");
        'idle: loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                () = self.trigger.pending() => {}
            }

            loop {
                let delay = match run_contained(&runner).await {
                    Ok(PassOutcome::Completed) => {
                        self.backoff.reset();
                        continue 'idle;
                    }
                    Ok(PassOutcome::RetryRequested { reason }) => {
                        handle_retry_requested(&reason, &mut self.backoff)
                    }
                    Err(e) => handle_pass_error(&e, &mut self.backoff),
                };

                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break 'idle,
                    () = self.trigger.pending() => {
                        debug!("Triggered during backoff, running pass now");
                    }
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
        info!("Worker stopped");
    }
}

/// Run one pass on its own task so a panic only fails that pass
async fn run_contained<R: PassRunner>(runner: &Arc<R>) -> Result<PassOutcome, ReconcilerError> {
    let runner = Arc::clone(runner);
    match tokio::spawn(async move { runner.run_pass().await }).await {
        Ok(result) => result,
        Err(e) => Err(ReconcilerError::Aborted(e.to_string())),
    }
}
