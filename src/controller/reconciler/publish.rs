//! # Config Publication
//!
//! Writes the `rook-ceph-object-bucket-<name>` ConfigMap that applications
//! mount to find their bucket.

use std::time::Duration;

use tracing::{debug, info};

use super::types::{bounded, ReconcilerError};
use crate::constants::CONFIG_NAME_PREFIX;
use crate::crd::ResourceKey;
use crate::observability::metrics;
use crate::provider::{BucketEndpoint, ConfigStore, PublishedConfig};

/// Name of the ConfigMap published for ObjectBucket `resource_name`
#[must_use]
pub fn config_name(resource_name: &str) -> String {
    format!("{CONFIG_NAME_PREFIX}{resource_name}")
}

/// Create the connection ConfigMap, or update it in place if it exists
///
/// # Errors
///
/// Returns `Publish` if the store fails or times out.
pub async fn publish_config(
    store: &dyn ConfigStore,
    key: &ResourceKey,
    endpoint: &BucketEndpoint,
    bucket_name: &str,
    timeout: Duration,
) -> Result<PublishedConfig, ReconcilerError> {
    let config = PublishedConfig {
        namespace: key.namespace.clone(),
        name: config_name(&key.name),
        owner: key.name.clone(),
        host: endpoint.host.clone(),
        port: endpoint.port,
        bucket_name: bucket_name.to_string(),
        tls: endpoint.tls,
    };
    let publish_error = |source: anyhow::Error| ReconcilerError::Publish {
        namespace: config.namespace.clone(),
        name: config.name.clone(),
        source,
    };

    let existing = bounded(
        timeout,
        "config lookup",
        store.get(&config.namespace, &config.name),
    )
    .await
    .map_err(publish_error)?;

    match existing {
        None => {
            bounded(timeout, "config create", store.create(&config))
                .await
                .map_err(publish_error)?;
            metrics::increment_configs_published("create");
            info!(config = %config.name, "Published bucket config");
        }
        Some(current) if current == config => {
            debug!(config = %config.name, "Bucket config already up to date");
        }
        Some(_) => {
            bounded(timeout, "config update", store.update(&config))
                .await
                .map_err(publish_error)?;
            metrics::increment_configs_published("update");
            info!(config = %config.name, "Updated bucket config");
        }
    }

    Ok(config)
}

/// Delete the connection ConfigMap of `key`; absence is success
///
/// # Errors
///
/// Returns `Deprovisioning` if the store fails or times out.
pub async fn unpublish_config(
    store: &dyn ConfigStore,
    key: &ResourceKey,
    timeout: Duration,
) -> Result<(), ReconcilerError> {
    let name = config_name(&key.name);
    let deleted = bounded(timeout, "config delete", store.delete(&key.namespace, &name))
        .await
        .map_err(|source| ReconcilerError::Deprovisioning {
            key: key.to_string(),
            source,
        })?;

    if deleted {
        info!(config = %name, "Deleted bucket config");
    } else {
        debug!(config = %name, "Bucket config already absent");
    }
    Ok(())
}
