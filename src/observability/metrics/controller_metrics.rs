//! # Controller Metrics
//!
//! Metrics for reconciliation passes, created revisions and requeues.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation pass metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "revision_controller_reconciliations_total",
        "Total number of reconciliation passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "revision_controller_reconciliation_errors_total",
            "Total number of failed reconciliation passes",
        ),
        &["error"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "revision_controller_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Revision metrics
static REVISIONS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "revision_controller_revisions_created_total",
        "Total number of revisions created",
    )
    .expect("Failed to create REVISIONS_CREATED_TOTAL metric - this should never happen")
});

static LATEST_REVISION: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "revision_controller_latest_revision",
        "Latest available revision observed or written by this controller",
    )
    .expect("Failed to create LATEST_REVISION metric - this should never happen")
});

// Queue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "revision_controller_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static TRIGGERS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "revision_controller_triggers_total",
        "Total number of watch notifications that enqueued a pass",
    )
    .expect("Failed to create TRIGGERS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REVISIONS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LATEST_REVISION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRIGGERS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(error: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[error]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_revisions_created() {
    REVISIONS_CREATED_TOTAL.inc();
}

pub fn set_latest_revision(revision: i32) {
    LATEST_REVISION.set(i64::from(revision));
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_triggers() {
    TRIGGERS_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_move() {
        let before = REVISIONS_CREATED_TOTAL.get();
        increment_revisions_created();
        assert!(REVISIONS_CREATED_TOTAL.get() > before);

        set_latest_revision(7);
        increment_requeues_total("retry-requested");
        assert!(REQUEUES_TOTAL.with_label_values(&["retry-requested"]).get() >= 1);
    }
}
