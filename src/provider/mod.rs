//! # Provider Interfaces
//!
//! Narrow interfaces to everything the reconciler talks to:
//!
//! - [`BucketResourceStore`] - cached ObjectBucket snapshots plus finalizer/status writes
//! - [`CredentialStore`] - label-equality queries over object user secrets
//! - [`ConfigStore`] - the ConfigMaps that publish connection details
//! - [`ObjectStorage`] - the S3-compatible object store
//!
//! `kubernetes` implements the first three against the API server, `s3`
//! implements the last with the AWS SDK.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::constants::{BUCKET_HOST_KEY, BUCKET_NAME_KEY, BUCKET_PORT_KEY, BUCKET_SSL_KEY};
use crate::crd::{ObjectBucket, ObjectBucketStatus, ResourceKey};

pub mod kubernetes;
pub mod s3;

/// Access keys of one object store user, read from its Secret
#[derive(Clone)]
pub struct CredentialRecord {
    pub namespace: String,
    /// Name of the Secret the keys were read from
    pub name: String,
    pub user: String,
    pub access_key_id: String,
    pub secret_access_key: Zeroizing<String>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Where clients reach the object store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Connection details published for one ObjectBucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedConfig {
    pub namespace: String,
    /// ConfigMap name (`rook-ceph-object-bucket-<resource>`)
    pub name: String,
    /// Name of the owning ObjectBucket
    pub owner: String,
    pub host: String,
    pub port: u16,
    pub bucket_name: String,
    pub tls: bool,
}

impl PublishedConfig {
    /// The four data fields as stored in the ConfigMap
    #[must_use]
    pub fn data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (BUCKET_HOST_KEY.to_string(), self.host.clone()),
            (BUCKET_PORT_KEY.to_string(), self.port.to_string()),
            (BUCKET_NAME_KEY.to_string(), self.bucket_name.clone()),
            (BUCKET_SSL_KEY.to_string(), self.tls.to_string()),
        ])
    }

    /// Rebuild from ConfigMap data
    ///
    /// # Errors
    ///
    /// Returns an error if a field is missing or the port/TLS values do not parse.
    pub fn from_data(
        namespace: &str,
        name: &str,
        owner: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let field = |key: &str| {
            data.get(key)
                .cloned()
                .with_context(|| format!("ConfigMap {namespace}/{name} has no {key}"))
        };
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            host: field(BUCKET_HOST_KEY)?,
            port: field(BUCKET_PORT_KEY)?
                .parse()
                .with_context(|| format!("ConfigMap {namespace}/{name} has an invalid port"))?,
            bucket_name: field(BUCKET_NAME_KEY)?,
            tls: field(BUCKET_SSL_KEY)?
                .parse()
                .with_context(|| format!("ConfigMap {namespace}/{name} has an invalid SSL flag"))?,
        })
    }
}

/// Result of a bucket deletion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketDeletion {
    Deleted,
    /// Nothing to delete
    Absent,
}

/// Object store failures the reconciler needs to tell apart
#[derive(Debug, Error)]
pub enum StorageError {
    /// The bucket exists but belongs to another account
    #[error("bucket '{bucket}' already exists and is owned by another user")]
    Conflict { bucket: String },

    /// The bucket still holds objects and force deletion was not requested
    #[error("bucket '{bucket}' is not empty")]
    NotEmpty { bucket: String },

    /// Network, authentication or service failure
    #[error(transparent)]
    Unavailable(#[from] anyhow::Error),
}

/// Cached ObjectBucket snapshots and the writes the reconciler performs on them
#[async_trait]
pub trait BucketResourceStore: Send + Sync {
    /// Latest snapshot for `key`, `None` once the resource is gone
    async fn get_by_key(&self, key: &ResourceKey) -> Result<Option<Arc<ObjectBucket>>>;

    /// Add the controller finalizer
    async fn add_finalizer(&self, resource: &ObjectBucket) -> Result<()>;

    /// Remove the controller finalizer. Succeeds if the resource is already gone.
    async fn remove_finalizer(&self, resource: &ObjectBucket) -> Result<()>;

    /// Replace the status subresource. Succeeds if the resource is already gone.
    async fn update_status(&self, key: &ResourceKey, status: &ObjectBucketStatus) -> Result<()>;
}

/// Label-equality queries over credential secrets
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Secrets in `namespace` whose label `label` equals `value`
    async fn list_by_label(&self, namespace: &str, label: &str, value: &str)
        -> Result<Vec<Secret>>;
}

/// Storage for published connection details
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedConfig>>;

    async fn create(&self, config: &PublishedConfig) -> Result<()>;

    /// Overwrite an existing record in place
    async fn update(&self, config: &PublishedConfig) -> Result<()>;

    /// Returns `false` if there was nothing to delete
    async fn delete(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// S3-compatible object storage
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create `name` as `credential`'s user, or confirm it already belongs to them
    async fn create_or_get_bucket(
        &self,
        credential: &CredentialRecord,
        name: &str,
    ) -> Result<BucketEndpoint, StorageError>;

    /// Delete `name`, emptying it first when `force_if_non_empty` is set.
    /// Without an owner credential the store's own credentials are used.
    async fn delete_bucket(
        &self,
        credential: Option<&CredentialRecord>,
        name: &str,
        force_if_non_empty: bool,
    ) -> Result<BucketDeletion, StorageError>;
}
