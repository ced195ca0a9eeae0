//! # Reconcile
//!
//! Drives one ObjectBucket through the pipeline:
//!
//! Add/Update: validate → finalizer → credential → bucket → config, writing the
//! status after each stage and stopping at the first failure.
//! Delete: config → bucket (per deletion policy) → finalizer.

use std::time::Instant;

use kube::ResourceExt;
use tracing::{debug, info, info_span, warn, Instrument};

use super::credentials::{resolve_credential, CredentialFields};
use super::deprovision::deprovision;
use super::provision::{bucket_name_for, ensure_bucket, validate_bucket_name};
use super::publish::{publish_config, unpublish_config};
use super::status;
use super::types::{bounded, EventKind, Memo, ReconcileOutcome, Reconciler, ReconcilerError};
use crate::crd::{BucketPhase, ObjectBucket, ObjectBucketStatus, ResourceKey};
use crate::observability::metrics;
use crate::provider::{CredentialRecord, PublishedConfig};

impl Reconciler {
    /// Reconcile the newest cached snapshot of `key`
    ///
    /// A missing snapshot or one carrying a deletion timestamp is a Delete,
    /// anything else an Update. A missing snapshot only withdraws the config:
    /// a provisioned resource keeps its finalizer until the bucket is gone.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; see [`ReconcilerError::is_retryable`].
    pub async fn reconcile_key(&self, key: &ResourceKey) -> Result<ReconcileOutcome, ReconcilerError> {
        let snapshot = self
            .buckets
            .get_by_key(key)
            .await
            .map_err(|source| ReconcilerError::ResourceStore {
                key: key.to_string(),
                source,
            })?;

        match snapshot {
            Some(resource) if resource.is_being_deleted() => {
                self.reconcile(EventKind::Delete, &resource).await
            }
            Some(resource) => self.reconcile(EventKind::Update, &resource).await,
            None => {
                let span = info_span!(
                    "controller.reconcile",
                    resource.namespace = %key.namespace,
                    resource.name = %key.name,
                    event = "Delete",
                );
                let run = self.observe(self.cleanup(key, None).instrument(span));
                self.serialized(key, run).await
            }
        }
    }

    /// Reconcile `resource` for a lifecycle event
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; see [`ReconcilerError::is_retryable`].
    pub async fn reconcile(
        &self,
        event: EventKind,
        resource: &ObjectBucket,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(key) = ResourceKey::from_resource(resource) else {
            return Err(ReconcilerError::Validation(format!(
                "ObjectBucket {} has no namespace",
                resource.name_any()
            )));
        };

        let span = info_span!(
            "controller.reconcile",
            resource.namespace = %key.namespace,
            resource.name = %key.name,
            event = ?event,
            generation = resource.generation(),
        );

        let run = async {
            match event {
                EventKind::Add | EventKind::Update => {
                    self.observe(self.apply(&key, resource).instrument(span)).await
                }
                EventKind::Delete => {
                    self.observe(self.cleanup(&key, Some(resource)).instrument(span))
                        .await
                }
            }
        };
        self.serialized(&key, run).await
    }

    async fn observe(
        &self,
        run: impl std::future::Future<Output = Result<ReconcileOutcome, ReconcilerError>>,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let start = Instant::now();
        metrics::increment_reconciliations();
        let result = run.await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::increment_reconciliation_errors(e.kind());
        }
        result
    }

    async fn apply(
        &self,
        key: &ResourceKey,
        resource: &ObjectBucket,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let generation = resource.generation();
        if let Some(outcome) = self.memoized(key, generation) {
            debug!(outcome = ?outcome, "Generation already settled, skipping");
            return Ok(outcome);
        }

        match self.run_pipeline(key, resource).await {
            Ok(config) => {
                self.remember(
                    key,
                    Memo::Published {
                        generation,
                        at: tokio::time::Instant::now(),
                    },
                );
                info!(config = %config.name, bucket = %config.bucket_name, "✅ ObjectBucket published");
                Ok(ReconcileOutcome::Published(config))
            }
            Err(error) => {
                if !error.is_retryable() {
                    self.remember(key, Memo::Terminal { generation });
                }
                warn!(
                    stage = %error.stage(),
                    reason = error.kind(),
                    retryable = error.is_retryable(),
                    "❌ Reconciliation failed: {}",
                    error
                );
                let mut failed = status::failed(&error, generation, resource.status.as_ref());
                failed.bucket_name = self.recorded_bucket(key, resource);
                self.record_status(key, failed).await;
                Err(error)
            }
        }
    }

    async fn run_pipeline(
        &self,
        key: &ResourceKey,
        resource: &ObjectBucket,
    ) -> Result<PublishedConfig, ReconcilerError> {
        let generation = resource.generation();
        let timeout = self.settings.operation_timeout;

        let user = resource.spec.object_user.trim();
        if user.is_empty() {
            return Err(ReconcilerError::Validation(
                "spec.objectUser must not be empty".to_string(),
            ));
        }
        let bucket_name = bucket_name_for(resource)?;

        bounded(timeout, "finalizer update", self.buckets.add_finalizer(resource))
            .await
            .map_err(|source| ReconcilerError::ResourceStore {
                key: key.to_string(),
                source,
            })?;

        let credential = self.resolve(&key.namespace, user).await?;
        self.record_status(
            key,
            status::progress(
                BucketPhase::CredentialResolved,
                generation,
                self.recorded_bucket(key, resource).as_deref(),
                None,
            ),
        )
        .await;

        let endpoint = ensure_bucket(self.storage.as_ref(), &credential, &bucket_name, timeout).await?;
        self.mark_provisioned(key);
        self.record_status(
            key,
            status::progress(
                BucketPhase::BucketProvisioned,
                generation,
                Some(&bucket_name),
                None,
            ),
        )
        .await;

        let config =
            publish_config(self.configs.as_ref(), key, &endpoint, &bucket_name, timeout).await?;
        self.record_status(
            key,
            status::progress(
                BucketPhase::Published,
                generation,
                Some(&bucket_name),
                Some(&config.name),
            ),
        )
        .await;

        Ok(config)
    }

    async fn cleanup(
        &self,
        key: &ResourceKey,
        resource: Option<&ObjectBucket>,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let timeout = self.settings.operation_timeout;

        if self.owns_remote_bucket(key, resource) {
            let credential = match resource {
                Some(r) => self.owner_credential(&key.namespace, &r.spec.object_user).await,
                None => None,
            };
            let result = deprovision(
                self.configs.as_ref(),
                self.storage.as_ref(),
                key,
                &key.name,
                credential.as_ref(),
                self.settings.deletion_policy,
                timeout,
            )
            .await;

            if let Err(error) = result {
                warn!(
                    stage = %error.stage(),
                    reason = error.kind(),
                    "❌ Deprovisioning failed: {}",
                    error
                );
                if let Some(r) = resource {
                    let mut failed = status::failed(&error, r.generation(), r.status.as_ref());
                    failed.bucket_name = self.recorded_bucket(key, r);
                    self.record_status(key, failed).await;
                }
                return Err(error);
            }
        } else {
            info!("No bucket recorded for this resource, removing config only");
            unpublish_config(self.configs.as_ref(), key, timeout).await?;
        }

        if let Some(r) = resource {
            bounded(timeout, "finalizer update", self.buckets.remove_finalizer(r))
                .await
                .map_err(|source| ReconcilerError::ResourceStore {
                    key: key.to_string(),
                    source,
                })?;
        }

        self.forget(key);
        info!("🗑️ ObjectBucket removed");
        Ok(ReconcileOutcome::Removed)
    }

    /// Whether deletion should touch the remote bucket named after `key`.
    /// Only a bucket this resource is recorded as having provisioned, never
    /// one that merely carries the same name.
    fn owns_remote_bucket(&self, key: &ResourceKey, resource: Option<&ObjectBucket>) -> bool {
        if validate_bucket_name(&key.name).is_err() {
            return false;
        }
        resource
            .and_then(|r| self.recorded_bucket(key, r))
            .is_some_and(|bucket| bucket == key.name)
    }

    /// Bucket provisioned for `resource`, from its status or from this process
    fn recorded_bucket(&self, key: &ResourceKey, resource: &ObjectBucket) -> Option<String> {
        resource
            .status
            .as_ref()
            .and_then(|s| s.bucket_name.clone())
            .or_else(|| self.provisioned_here(key).then(|| key.name.clone()))
    }

    async fn resolve(&self, namespace: &str, user: &str) -> Result<CredentialRecord, ReconcilerError> {
        resolve_credential(
            self.credentials.as_ref(),
            namespace,
            user,
            CredentialFields {
                access_key: &self.settings.access_key_field,
                secret_key: &self.settings.secret_key_field,
            },
            self.settings.operation_timeout,
        )
        .await
    }

    /// The owner's credential if it still resolves; deletion proceeds without it otherwise
    async fn owner_credential(&self, namespace: &str, user: &str) -> Option<CredentialRecord> {
        let user = user.trim();
        if user.is_empty() {
            return None;
        }
        match self.resolve(namespace, user).await {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!(
                    "Owner credential unavailable, falling back to controller credentials: {}",
                    e
                );
                None
            }
        }
    }

    /// Best-effort status write; failures are logged, never propagated
    async fn record_status(&self, key: &ResourceKey, status: ObjectBucketStatus) {
        let result = bounded(
            self.settings.operation_timeout,
            "status update",
            self.buckets.update_status(key, &status),
        )
        .await;
        if let Err(e) = result {
            warn!("Failed to update status of ObjectBucket {}: {:#}", key, e);
        }
    }
}
