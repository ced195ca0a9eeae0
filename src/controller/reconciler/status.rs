//! # Status
//!
//! Builds the ObjectBucket status written after each pipeline stage.

use crate::crd::{BucketPhase, Condition, ObjectBucketStatus};

use super::types::ReconcilerError;

/// Status for a stage that completed
#[must_use]
pub fn progress(
    phase: BucketPhase,
    generation: i64,
    bucket_name: Option<&str>,
    config_map_name: Option<&str>,
) -> ObjectBucketStatus {
    let (reason, message) = match phase {
        BucketPhase::Unprovisioned => ("Pending", "Waiting for the first reconciliation"),
        BucketPhase::CredentialResolved => ("CredentialResolved", "Object user credential found"),
        BucketPhase::BucketProvisioned => ("BucketProvisioned", "Bucket exists in the object store"),
        BucketPhase::Published => ("Published", "Bucket connection details published"),
        BucketPhase::Failed => ("Failed", "Reconciliation failed"),
    };

    ObjectBucketStatus {
        phase: Some(phase),
        failed_stage: None,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        retryable: None,
        conditions: vec![Condition::ready(phase, reason, Some(message.to_string()))],
        observed_generation: Some(generation),
        bucket_name: bucket_name.map(str::to_string),
        config_map_name: config_map_name.map(str::to_string),
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
    }
}

/// Status for a failed stage. Keeps the bucket and config names already known.
#[must_use]
pub fn failed(
    error: &ReconcilerError,
    generation: i64,
    previous: Option<&ObjectBucketStatus>,
) -> ObjectBucketStatus {
    let message = error.to_string();
    ObjectBucketStatus {
        phase: Some(BucketPhase::Failed),
        failed_stage: Some(error.stage().to_string()),
        reason: Some(error.kind().to_string()),
        message: Some(message.clone()),
        retryable: Some(error.is_retryable()),
        conditions: vec![Condition::ready(
            BucketPhase::Failed,
            error.kind(),
            Some(message),
        )],
        observed_generation: Some(generation),
        bucket_name: previous.and_then(|s| s.bucket_name.clone()),
        config_map_name: previous.and_then(|s| s.config_map_name.clone()),
        last_reconcile_time: Some(chrono::Utc::now().to_rfc3339()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_status() {
        let status = progress(BucketPhase::Published, 4, Some("photos"), Some("cm"));
        assert_eq!(status.phase, Some(BucketPhase::Published));
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.failed_stage, None);
    }

    #[test]
    fn test_failed_status_records_stage_and_reason() {
        let previous = progress(BucketPhase::BucketProvisioned, 2, Some("photos"), None);
        let error = ReconcilerError::CredentialNotFound {
            namespace: "media".to_string(),
            user: "alice".to_string(),
        };
        let status = failed(&error, 3, Some(&previous));
        assert_eq!(status.phase, Some(BucketPhase::Failed));
        assert_eq!(status.failed_stage.as_deref(), Some("credentials"));
        assert_eq!(status.reason.as_deref(), Some("CredentialNotFound"));
        assert_eq!(status.retryable, Some(true));
        assert_eq!(status.bucket_name.as_deref(), Some("photos"));
        assert_eq!(status.conditions[0].status, "False");
    }
}
