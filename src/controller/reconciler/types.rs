//! # Types
//!
//! Core types for the reconciler.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::config::{BucketDeletionPolicy, ControllerConfig};
use crate::constants::{
    DEFAULT_ACCESS_KEY_FIELD, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS,
    DEFAULT_SECRET_KEY_FIELD,
};
use crate::crd::ResourceKey;
use crate::provider::{
    BucketResourceStore, ConfigStore, CredentialStore, ObjectStorage, PublishedConfig,
};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid ObjectBucket: {0}")]
    Validation(String),

    #[error("no credential secret labelled user={user} in namespace {namespace}")]
    CredentialNotFound { namespace: String, user: String },

    #[error(
        "{} credential secrets labelled user={user} in namespace {namespace}: {}",
        .secrets.len(),
        .secrets.join(", ")
    )]
    AmbiguousCredential {
        namespace: String,
        user: String,
        secrets: Vec<String>,
    },

    #[error("credential secret {namespace}/{secret} has no usable '{field}' field")]
    MalformedCredential {
        namespace: String,
        secret: String,
        field: String,
    },

    #[error("failed to look up credentials of user {user} in namespace {namespace}: {source:#}")]
    CredentialLookup {
        namespace: String,
        user: String,
        source: anyhow::Error,
    },

    #[error("failed to provision bucket {bucket}: {source:#}")]
    Provisioning {
        bucket: String,
        source: anyhow::Error,
    },

    #[error("bucket {bucket} already exists and is owned by another user")]
    BucketConflict { bucket: String },

    #[error("failed to publish ConfigMap {namespace}/{name}: {source:#}")]
    Publish {
        namespace: String,
        name: String,
        source: anyhow::Error,
    },

    #[error("bucket {bucket} is not empty and the deletion policy refuses to purge it")]
    BucketNotEmpty { bucket: String },

    #[error("failed to deprovision {key}: {source:#}")]
    Deprovisioning { key: String, source: anyhow::Error },

    #[error("failed to update ObjectBucket {key}: {source:#}")]
    ResourceStore { key: String, source: anyhow::Error },
}

impl ReconcilerError {
    /// Whether the work queue should retry this failure with backoff.
    /// Terminal failures wait for the spec to change.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation(_) | Self::BucketConflict { .. })
    }

    /// Stable label used in metrics and the status `reason`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::CredentialNotFound { .. } => "CredentialNotFound",
            Self::AmbiguousCredential { .. } => "AmbiguousCredential",
            Self::MalformedCredential { .. } => "MalformedCredential",
            Self::CredentialLookup { .. } => "CredentialLookup",
            Self::Provisioning { .. } => "Provisioning",
            Self::BucketConflict { .. } => "BucketConflict",
            Self::Publish { .. } => "Publish",
            Self::BucketNotEmpty { .. } => "BucketNotEmpty",
            Self::Deprovisioning { .. } => "Deprovisioning",
            Self::ResourceStore { .. } => "ResourceStore",
        }
    }

    /// Pipeline stage the failure happened in
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Validation(_) => Stage::Validation,
            Self::CredentialNotFound { .. }
            | Self::AmbiguousCredential { .. }
            | Self::MalformedCredential { .. }
            | Self::CredentialLookup { .. } => Stage::Credentials,
            Self::Provisioning { .. } | Self::BucketConflict { .. } => Stage::Provisioning,
            Self::Publish { .. } => Stage::Publishing,
            Self::BucketNotEmpty { .. } | Self::Deprovisioning { .. } => Stage::Deprovisioning,
            Self::ResourceStore { .. } => Stage::Bookkeeping,
        }
    }
}

/// Pipeline stage, recorded as `failedStage` in the status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Credentials,
    Provisioning,
    Publishing,
    Deprovisioning,
    /// Finalizer and status writes on the ObjectBucket itself
    Bookkeeping,
}

impl Stage {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validation => "validation",
            Stage::Credentials => "credentials",
            Stage::Provisioning => "provisioning",
            Stage::Publishing => "publishing",
            Stage::Deprovisioning => "deprovisioning",
            Stage::Bookkeeping => "bookkeeping",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle notification kind. Add and Update run the same pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The pipeline ran to completion
    Published(PublishedConfig),
    /// This generation was already published within the resync window
    UpToDate,
    /// This generation failed terminally; nothing to do until the spec changes
    AwaitingSpecChange,
    /// External state was removed
    Removed,
}

/// Knobs the reconciler reads from [`ControllerConfig`]
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub deletion_policy: BucketDeletionPolicy,
    pub resync_interval: Duration,
    pub operation_timeout: Duration,
    pub access_key_field: String,
    pub secret_key_field: String,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            deletion_policy: BucketDeletionPolicy::default(),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            access_key_field: DEFAULT_ACCESS_KEY_FIELD.to_string(),
            secret_key_field: DEFAULT_SECRET_KEY_FIELD.to_string(),
        }
    }
}

impl From<&ControllerConfig> for ReconcilerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            deletion_policy: config.deletion_policy,
            resync_interval: config.resync_interval(),
            operation_timeout: config.operation_timeout(),
            access_key_field: config.access_key_field.clone(),
            secret_key_field: config.secret_key_field.clone(),
        }
    }
}

/// What this process last learned about a resource generation
#[derive(Debug, Clone, Copy)]
pub(crate) enum Memo {
    Published { generation: i64, at: Instant },
    Terminal { generation: i64 },
}

pub struct Reconciler {
    pub(crate) buckets: Arc<dyn BucketResourceStore>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) configs: Arc<dyn ConfigStore>,
    pub(crate) storage: Arc<dyn ObjectStorage>,
    pub(crate) settings: ReconcilerSettings,
    memo: Mutex<HashMap<ResourceKey, Memo>>,
    /// Resources whose bucket this process created or confirmed
    provisioned: Mutex<HashSet<ResourceKey>>,
    // One reconcile per resource at a time, even when called outside the work queue
    key_locks: Mutex<HashMap<ResourceKey, Arc<AsyncMutex<()>>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        buckets: Arc<dyn BucketResourceStore>,
        credentials: Arc<dyn CredentialStore>,
        configs: Arc<dyn ConfigStore>,
        storage: Arc<dyn ObjectStorage>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            buckets,
            credentials,
            configs,
            storage,
            settings,
            memo: Mutex::new(HashMap::new()),
            provisioned: Mutex::new(HashSet::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run `fut` while holding the per-resource lock of `key`
    pub(crate) async fn serialized<T>(&self, key: &ResourceKey, fut: impl Future<Output = T>) -> T {
        let lock = {
            let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let result = {
            let _guard = lock.lock().await;
            fut.await
        };
        drop(lock);

        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Keep the entry while another task is waiting on it
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
        result
    }

    /// Outcome to return without doing any work, if this generation is settled
    pub(crate) fn memoized(&self, key: &ResourceKey, generation: i64) -> Option<ReconcileOutcome> {
        let memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        match memo.get(key)? {
            Memo::Published { generation: g, at }
                if *g == generation && at.elapsed() < self.settings.resync_interval =>
            {
                Some(ReconcileOutcome::UpToDate)
            }
            Memo::Terminal { generation: g } if *g == generation => {
                Some(ReconcileOutcome::AwaitingSpecChange)
            }
            _ => None,
        }
    }

    pub(crate) fn remember(&self, key: &ResourceKey, entry: Memo) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), entry);
    }

    pub(crate) fn mark_provisioned(&self, key: &ResourceKey) {
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
    }

    pub(crate) fn provisioned_here(&self, key: &ResourceKey) -> bool {
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub(crate) fn forget(&self, key: &ResourceKey) {
        self.memo
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        self.provisioned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Bound `fut` by `limit`, turning an elapsed deadline into an error of the caller's type
pub(crate) async fn bounded<T, E, F>(limit: Duration, operation: &str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<anyhow::Error>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} timed out after {:?}", operation, limit).into()),
    }
}
