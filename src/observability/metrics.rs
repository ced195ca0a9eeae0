//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `object_bucket_reconciliations_total` - Total number of reconciliations
//! - `object_bucket_reconciliation_errors_total` - Reconciliation errors by failure kind
//! - `object_bucket_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `object_bucket_requeues_total` - Requeues by trigger source
//! - `object_bucket_buckets_provisioned_total` - Buckets created in the object store
//! - `object_bucket_buckets_deleted_total` - Buckets removed from the object store
//! - `object_bucket_configs_published_total` - ConfigMaps written, by create/update
//! - `object_bucket_storage_operations_total` - Object store calls by operation
//! - `object_bucket_storage_operation_duration_seconds` - Duration of object store calls
//! - `object_bucket_storage_operation_errors_total` - Failed object store calls by operation
//! - `object_bucket_workqueue_depth` - Keys waiting in the work queue

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::{LazyLock, OnceLock};

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTERED: OnceLock<()> = OnceLock::new();

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "object_bucket_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "object_bucket_reconciliation_errors_total",
            "Total number of reconciliation errors by failure kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "object_bucket_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "object_bucket_requeues_total",
            "Total number of requeues by trigger source",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static BUCKETS_PROVISIONED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "object_bucket_buckets_provisioned_total",
        "Total number of buckets created in the object store",
    )
    .expect("Failed to create BUCKETS_PROVISIONED_TOTAL metric - this should never happen")
});

static BUCKETS_DELETED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "object_bucket_buckets_deleted_total",
        "Total number of buckets deleted from the object store",
    )
    .expect("Failed to create BUCKETS_DELETED_TOTAL metric - this should never happen")
});

static CONFIGS_PUBLISHED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "object_bucket_configs_published_total",
            "Total number of connection ConfigMaps written by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create CONFIGS_PUBLISHED_TOTAL metric - this should never happen")
});

static STORAGE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "object_bucket_storage_operations_total",
            "Total number of object store operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create STORAGE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORAGE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "object_bucket_storage_operation_duration_seconds",
            "Duration of object store operations in seconds by operation",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create STORAGE_OPERATION_DURATION metric - this should never happen")
});

static STORAGE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "object_bucket_storage_operation_errors_total",
            "Total number of failed object store operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create STORAGE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static WORKQUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "object_bucket_workqueue_depth",
        "Number of keys waiting in the work queue",
    )
    .expect("Failed to create WORKQUEUE_DEPTH metric - this should never happen")
});

/// Register all collectors with [`REGISTRY`]. Calling it again is a no-op.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    if REGISTERED.get().is_some() {
        return Ok(());
    }

    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BUCKETS_PROVISIONED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BUCKETS_DELETED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIGS_PUBLISHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORAGE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_DEPTH.clone()))?;

    let _ = REGISTERED.set(());
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_buckets_provisioned() {
    BUCKETS_PROVISIONED_TOTAL.inc();
}

#[cfg(test)]
pub(crate) fn buckets_provisioned() -> u64 {
    BUCKETS_PROVISIONED_TOTAL.get()
}

pub fn increment_buckets_deleted() {
    BUCKETS_DELETED_TOTAL.inc();
}

pub fn increment_configs_published(operation: &str) {
    CONFIGS_PUBLISHED_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_storage_operation(operation: &str, duration: f64) {
    STORAGE_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
    STORAGE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_storage_operation_errors(operation: &str) {
    STORAGE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn set_workqueue_depth(depth: usize) {
    WORKQUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        assert!(register_metrics().is_ok());
        // Second registration must not trip AlreadyReg
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["CredentialNotFound"])
            .get();
        increment_reconciliation_errors("CredentialNotFound");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["CredentialNotFound"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(1.5);
        // Histogram observation doesn't return a value
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get();
        increment_requeues_total("error-backoff");
        let after = REQUEUES_TOTAL.with_label_values(&["error-backoff"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_record_storage_operation() {
        let before = STORAGE_OPERATIONS_TOTAL
            .with_label_values(&["create_bucket"])
            .get();
        record_storage_operation("create_bucket", 0.2);
        let after = STORAGE_OPERATIONS_TOTAL
            .with_label_values(&["create_bucket"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_set_workqueue_depth() {
        set_workqueue_depth(7);
        assert_eq!(WORKQUEUE_DEPTH.get(), 7);
        set_workqueue_depth(0);
        assert_eq!(WORKQUEUE_DEPTH.get(), 0);
    }
}
