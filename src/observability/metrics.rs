//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `dynakube_reconciliations_total` - Total number of reconciliations
//! - `dynakube_reconciliation_errors_total` - Total number of failed reconciliations
//! - `dynakube_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `dynakube_objects_applied_total` - Owned objects written, by kind and action
//! - `dynakube_token_rotations_total` - ActiveGate auth tokens rotated
//! - `dynakube_certificate_renewals_total` - Extensions TLS certificates generated

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "dynakube_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "dynakube_reconciliation_errors_total",
        "Total number of failed reconciliations",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "dynakube_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static OBJECTS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "dynakube_objects_applied_total",
            "Owned objects written to the cluster",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create OBJECTS_APPLIED_TOTAL metric - this should never happen")
});

static TOKEN_ROTATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "dynakube_token_rotations_total",
        "ActiveGate auth tokens rotated because they reached their maximum age",
    )
    .expect("Failed to create TOKEN_ROTATIONS_TOTAL metric - this should never happen")
});

static CERTIFICATE_RENEWALS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "dynakube_certificate_renewals_total",
        "Extensions controller certificates generated",
    )
    .expect("Failed to create CERTIFICATE_RENEWALS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(OBJECTS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKEN_ROTATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CERTIFICATE_RENEWALS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

/// `action` is one of `create`, `update`, `delete`
pub fn record_object_applied(kind: &str, action: &str) {
    OBJECTS_APPLIED_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_token_rotations() {
    TOKEN_ROTATIONS_TOTAL.inc();
}

pub fn increment_certificate_renewals() {
    CERTIFICATE_RENEWALS_TOTAL.inc();
}
