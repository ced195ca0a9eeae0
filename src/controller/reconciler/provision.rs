//! # Bucket Provisioning
//!
//! Creates the bucket as the object user, or confirms it already exists
//! and belongs to them.

use std::sync::LazyLock;
use std::time::Duration;

use kube::ResourceExt;
use regex::Regex;
use tracing::info;

use super::types::{bounded, ReconcilerError};
use crate::crd::ObjectBucket;
use crate::provider::{BucketEndpoint, CredentialRecord, ObjectStorage, StorageError};

static BUCKET_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$")
        .expect("Failed to compile bucket name regex - this should never happen")
});

static IPV4_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$")
        .expect("Failed to compile IPv4 regex - this should never happen")
});

/// Bucket name for an ObjectBucket: its resource name, checked against S3 naming rules
///
/// # Errors
///
/// Returns `Validation` if the resource name is not a valid bucket name.
pub fn bucket_name_for(resource: &ObjectBucket) -> Result<String, ReconcilerError> {
    let name = resource.name_any();
    validate_bucket_name(&name)?;
    Ok(name)
}

/// # Errors
///
/// Returns `Validation` describing the first rule `name` breaks.
pub fn validate_bucket_name(name: &str) -> Result<(), ReconcilerError> {
    let invalid = |rule: &str| Err(ReconcilerError::Validation(format!("bucket name '{name}' {rule}")));

    if name.len() < 3 || name.len() > 63 {
        return invalid("must be between 3 and 63 characters long");
    }
    if !BUCKET_NAME.is_match(name) {
        return invalid(
            "may only contain lowercase letters, digits, dots and hyphens, and must start and end with a letter or digit",
        );
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return invalid("must not contain adjacent dots or dots next to hyphens");
    }
    if IPV4_ADDRESS.is_match(name) {
        return invalid("must not be formatted as an IP address");
    }
    if name.starts_with("xn--") || name.ends_with("-s3alias") {
        return invalid("uses a reserved prefix or suffix");
    }
    Ok(())
}

/// Create or confirm bucket `name` as `credential`'s user
///
/// # Errors
///
/// `BucketConflict` when another user owns the name, `Provisioning` for
/// everything else (including timeouts).
pub async fn ensure_bucket(
    storage: &dyn ObjectStorage,
    credential: &CredentialRecord,
    name: &str,
    timeout: Duration,
) -> Result<BucketEndpoint, ReconcilerError> {
    let endpoint = bounded(
        timeout,
        "bucket provisioning",
        storage.create_or_get_bucket(credential, name),
    )
    .await
    .map_err(|e| match e {
        StorageError::Conflict { bucket } => ReconcilerError::BucketConflict { bucket },
        other => ReconcilerError::Provisioning {
            bucket: name.to_string(),
            source: other.into(),
        },
    })?;

    info!(
        bucket = name,
        host = %endpoint.host,
        port = endpoint.port,
        "Bucket provisioned"
    );
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_bucket_names() {
        for name in ["photos", "team-a.backups", "b01", "a".repeat(63).as_str()] {
            assert!(validate_bucket_name(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn test_invalid_bucket_names() {
        for name in [
            "ab",
            "a".repeat(64).as_str(),
            "-photos",
            "photos-",
            "Photos",
            "pho..tos",
            "pho.-tos",
            "192.168.1.10",
            "xn--photos",
            "photos-s3alias",
        ] {
            let err = validate_bucket_name(name).unwrap_err();
            assert!(!err.is_retryable(), "{name} should fail terminally");
        }
    }
}
