//! Common test utilities for reconciler integration tests
//!
//! In-memory stand-ins for the Kubernetes stores and the object store, with
//! call counters, plus builders for ObjectBuckets and credential Secrets.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use k8s_openapi::ByteString;

use object_bucket_controller::constants::BUCKET_FINALIZER;
use object_bucket_controller::controller::reconciler::{Reconciler, ReconcilerSettings};
use object_bucket_controller::crd::{ObjectBucket, ObjectBucketSpec, ObjectBucketStatus, ResourceKey};
use object_bucket_controller::provider::{
    BucketDeletion, BucketEndpoint, BucketResourceStore, ConfigStore, CredentialRecord,
    CredentialStore, ObjectStorage, PublishedConfig, StorageError,
};

pub const NAMESPACE: &str = "media";

pub fn endpoint() -> BucketEndpoint {
    BucketEndpoint {
        host: "rook-ceph-rgw-my-store.rook-ceph.svc".to_string(),
        port: 80,
        tls: false,
    }
}

pub fn object_bucket(name: &str, user: &str, generation: i64) -> ObjectBucket {
    let mut ob = ObjectBucket::new(
        name,
        ObjectBucketSpec {
            object_user: user.to_string(),
        },
    );
    ob.metadata.namespace = Some(NAMESPACE.to_string());
    ob.metadata.generation = Some(generation);
    ob
}

/// `resource` with a deletion timestamp, as the API server reports it after a delete request
pub fn being_deleted(mut resource: ObjectBucket) -> ObjectBucket {
    let timestamp: Time = serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
        .expect("valid RFC3339 timestamp");
    resource.metadata.deletion_timestamp = Some(timestamp);
    resource
}

pub fn credential_secret(name: &str, user: &str, access_key: &str, secret_key: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([("user".to_string(), user.to_string())])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            ("AccessKey".to_string(), ByteString(access_key.as_bytes().to_vec())),
            ("SecretKey".to_string(), ByteString(secret_key.as_bytes().to_vec())),
        ])),
        ..Default::default()
    }
}

/// Consume one injected failure from `budget`, if any are left
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// ObjectBucket cache plus the writes the reconciler issues against it
#[derive(Default)]
pub struct FakeBuckets {
    pub resources: Mutex<HashMap<ResourceKey, ObjectBucket>>,
    pub status_writes: AtomicUsize,
}

impl FakeBuckets {
    pub fn insert(&self, resource: ObjectBucket) {
        let key = ResourceKey::from_resource(&resource).expect("namespaced resource");
        self.resources.lock().unwrap().insert(key, resource);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<ObjectBucket> {
        self.resources.lock().unwrap().get(key).cloned()
    }

    pub fn status(&self, key: &ResourceKey) -> Option<ObjectBucketStatus> {
        self.get(key).and_then(|r| r.status)
    }
}

#[async_trait]
impl BucketResourceStore for FakeBuckets {
    async fn get_by_key(&self, key: &ResourceKey) -> Result<Option<Arc<ObjectBucket>>> {
        Ok(self.get(key).map(Arc::new))
    }

    async fn add_finalizer(&self, resource: &ObjectBucket) -> Result<()> {
        let key = ResourceKey::from_resource(resource).expect("namespaced resource");
        let mut resources = self.resources.lock().unwrap();
        let stored = resources.entry(key).or_insert_with(|| resource.clone());
        let finalizers = stored.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == BUCKET_FINALIZER) {
            finalizers.push(BUCKET_FINALIZER.to_string());
        }
        Ok(())
    }

    async fn remove_finalizer(&self, resource: &ObjectBucket) -> Result<()> {
        let key = ResourceKey::from_resource(resource).expect("namespaced resource");
        let mut resources = self.resources.lock().unwrap();
        let Some(stored) = resources.get_mut(&key) else {
            return Ok(());
        };
        if let Some(finalizers) = stored.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != BUCKET_FINALIZER);
        }
        // The API server drops a deleted object once its last finalizer is gone
        let releasable = stored.is_being_deleted()
            && stored.metadata.finalizers.as_ref().is_none_or(Vec::is_empty);
        if releasable {
            resources.remove(&key);
        }
        Ok(())
    }

    async fn update_status(&self, key: &ResourceKey, status: &ObjectBucketStatus) -> Result<()> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        if let Some(stored) = self.resources.lock().unwrap().get_mut(key) {
            stored.status = Some(status.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSecrets {
    pub secrets: Mutex<Vec<Secret>>,
    pub lookups: AtomicUsize,
}

impl FakeSecrets {
    pub fn insert(&self, secret: Secret) {
        self.secrets.lock().unwrap().push(secret);
    }
}

#[async_trait]
impl CredentialStore for FakeSecrets {
    async fn list_by_label(&self, namespace: &str, label: &str, value: &str) -> Result<Vec<Secret>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(namespace))
            .filter(|s| {
                s.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(label))
                    .is_some_and(|v| v == value)
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeConfigs {
    pub configs: Mutex<HashMap<(String, String), PublishedConfig>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    /// Number of upcoming creates or updates to reject
    pub failing_writes: AtomicUsize,
}

impl FakeConfigs {
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn get(&self, name: &str) -> Option<PublishedConfig> {
        self.configs
            .lock()
            .unwrap()
            .get(&(NAMESPACE.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.configs.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfigStore for FakeConfigs {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedConfig>> {
        Ok(self
            .configs
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, config: &PublishedConfig) -> Result<()> {
        if take_failure(&self.failing_writes) {
            bail!("the server is currently unable to handle the request");
        }
        let mut configs = self.configs.lock().unwrap();
        let key = (config.namespace.clone(), config.name.clone());
        if configs.contains_key(&key) {
            bail!("configmaps \"{}\" already exists", config.name);
        }
        configs.insert(key, config.clone());
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, config: &PublishedConfig) -> Result<()> {
        if take_failure(&self.failing_writes) {
            bail!("the server is currently unable to handle the request");
        }
        self.configs
            .lock()
            .unwrap()
            .insert((config.namespace.clone(), config.name.clone()), config.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .configs
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }
}

#[derive(Debug, Clone)]
pub struct FakeBucket {
    /// Access key id of the user that created the bucket
    pub owner: String,
    pub objects: usize,
}

#[derive(Default)]
pub struct FakeStorage {
    pub buckets: Mutex<HashMap<String, FakeBucket>>,
    /// Buckets actually created, not merely found
    pub creates: AtomicUsize,
    pub ensure_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    /// Number of upcoming ensure calls to fail as unavailable
    pub failing_ensures: AtomicUsize,
}

impl FakeStorage {
    pub fn fail_next_ensures(&self, count: usize) {
        self.failing_ensures.store(count, Ordering::SeqCst);
    }

    /// A bucket that already exists, created by someone else
    pub fn preexisting(&self, name: &str, owner: &str, objects: usize) {
        self.buckets.lock().unwrap().insert(
            name.to_string(),
            FakeBucket {
                owner: owner.to_string(),
                objects,
            },
        );
    }

    pub fn put_objects(&self, name: &str, objects: usize) {
        if let Some(bucket) = self.buckets.lock().unwrap().get_mut(name) {
            bucket.objects += objects;
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.buckets.lock().unwrap().contains_key(name)
    }
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn create_or_get_bucket(
        &self,
        credential: &CredentialRecord,
        name: &str,
    ) -> Result<BucketEndpoint, StorageError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent callers interleave with this one
        tokio::task::yield_now().await;
        if take_failure(&self.failing_ensures) {
            return Err(StorageError::Unavailable(anyhow!(
                "dispatch failure: connection refused"
            )));
        }

        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(name) {
            Some(bucket) if bucket.owner == credential.access_key_id => Ok(endpoint()),
            Some(_) => Err(StorageError::Conflict {
                bucket: name.to_string(),
            }),
            None => {
                buckets.insert(
                    name.to_string(),
                    FakeBucket {
                        owner: credential.access_key_id.clone(),
                        objects: 0,
                    },
                );
                self.creates.fetch_add(1, Ordering::SeqCst);
                Ok(endpoint())
            }
        }
    }

    async fn delete_bucket(
        &self,
        _credential: Option<&CredentialRecord>,
        name: &str,
        force_if_non_empty: bool,
    ) -> Result<BucketDeletion, StorageError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut buckets = self.buckets.lock().unwrap();
        match buckets.get(name) {
            None => Ok(BucketDeletion::Absent),
            Some(bucket) if bucket.objects > 0 && !force_if_non_empty => {
                Err(StorageError::NotEmpty {
                    bucket: name.to_string(),
                })
            }
            Some(_) => {
                buckets.remove(name);
                Ok(BucketDeletion::Deleted)
            }
        }
    }
}

/// A reconciler wired to fresh fakes
pub struct Harness {
    pub buckets: Arc<FakeBuckets>,
    pub secrets: Arc<FakeSecrets>,
    pub configs: Arc<FakeConfigs>,
    pub storage: Arc<FakeStorage>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ReconcilerSettings::default())
    }

    pub fn with_settings(settings: ReconcilerSettings) -> Self {
        let buckets = Arc::new(FakeBuckets::default());
        let secrets = Arc::new(FakeSecrets::default());
        let configs = Arc::new(FakeConfigs::default());
        let storage = Arc::new(FakeStorage::default());
        let reconciler = Arc::new(Reconciler::new(
            buckets.clone(),
            secrets.clone(),
            configs.clone(),
            storage.clone(),
            settings,
        ));
        Self {
            buckets,
            secrets,
            configs,
            storage,
            reconciler,
        }
    }

    /// Register `resource` in the cache and a credential for its user
    pub fn with_resource(self, resource: &ObjectBucket) -> Self {
        self.buckets.insert(resource.clone());
        self.secrets.insert(credential_secret(
            &format!("rook-ceph-object-user-my-store-{}", resource.spec.object_user),
            &resource.spec.object_user,
            &format!("AK-{}", resource.spec.object_user),
            "s3cr3t",
        ));
        self
    }
}
