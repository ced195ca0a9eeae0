//! # Deprovisioning
//!
//! Reverses publication, then provisioning. The ConfigMap goes first so
//! applications stop discovering a bucket that is about to disappear.

use std::time::Duration;

use tracing::{debug, info};

use super::publish::unpublish_config;
use super::types::{bounded, ReconcilerError};
use crate::config::BucketDeletionPolicy;
use crate::crd::ResourceKey;
use crate::provider::{BucketDeletion, ConfigStore, CredentialRecord, ObjectStorage, StorageError};

/// Delete the published config and the remote bucket of `key`
///
/// `credential` is the owner's credential when it can still be resolved;
/// without it the storage adapter falls back to its own credentials.
///
/// # Errors
///
/// `BucketNotEmpty` when the bucket holds objects under the `Refuse`
/// policy, `Deprovisioning` for store failures and timeouts.
pub async fn deprovision(
    configs: &dyn ConfigStore,
    storage: &dyn ObjectStorage,
    key: &ResourceKey,
    bucket_name: &str,
    credential: Option<&CredentialRecord>,
    policy: BucketDeletionPolicy,
    timeout: Duration,
) -> Result<BucketDeletion, ReconcilerError> {
    unpublish_config(configs, key, timeout).await?;

    let deletion = bounded(
        timeout,
        "bucket deletion",
        storage.delete_bucket(credential, bucket_name, policy.force_if_non_empty()),
    )
    .await
    .map_err(|e| match e {
        StorageError::NotEmpty { bucket } => ReconcilerError::BucketNotEmpty { bucket },
        other => ReconcilerError::Deprovisioning {
            key: key.to_string(),
            source: other.into(),
        },
    })?;

    match deletion {
        BucketDeletion::Deleted => info!(bucket = bucket_name, policy = %policy, "Bucket deleted"),
        BucketDeletion::Absent => debug!(bucket = bucket_name, "Bucket already absent"),
    }
    Ok(deletion)
}
