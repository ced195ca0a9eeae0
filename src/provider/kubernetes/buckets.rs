use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use kube_runtime::reflector::{ObjectRef, Store};
use serde_json::json;
use tracing::debug;

use super::is_not_found;
use crate::constants::BUCKET_FINALIZER;
use crate::crd::{ObjectBucket, ObjectBucketStatus, ResourceKey};
use crate::provider::BucketResourceStore;

/// Reads come from the reflector cache kept by the watch loop, writes go to
/// the API server as merge patches.
#[derive(Clone)]
pub struct KubeBucketStore {
    client: Client,
    reader: Store<ObjectBucket>,
}

impl KubeBucketStore {
    #[must_use]
    pub fn new(client: Client, reader: Store<ObjectBucket>) -> Self {
        Self { client, reader }
    }

    fn api(&self, namespace: &str) -> Api<ObjectBucket> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Replace the finalizer list, failing with 409 if the object changed since `resource` was read
    async fn patch_finalizers(&self, resource: &ObjectBucket, finalizers: Vec<String>) -> Result<()> {
        let namespace = resource.namespace().unwrap_or_default();
        let name = resource.name_any();
        let patch = json!({
            "metadata": {
                "resourceVersion": resource.resource_version(),
                "finalizers": finalizers,
            }
        });

        match self
            .api(&namespace)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("ObjectBucket {}/{} is already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(e).with_context(|| {
                format!("Failed to patch finalizers of ObjectBucket {namespace}/{name}")
            }),
        }
    }
}

#[async_trait]
impl BucketResourceStore for KubeBucketStore {
    async fn get_by_key(&self, key: &ResourceKey) -> Result<Option<Arc<ObjectBucket>>> {
        Ok(self
            .reader
            .get(&ObjectRef::new(&key.name).within(&key.namespace)))
    }

    async fn add_finalizer(&self, resource: &ObjectBucket) -> Result<()> {
        if resource.has_finalizer() {
            return Ok(());
        }
        let mut finalizers = resource.finalizers().to_vec();
        finalizers.push(BUCKET_FINALIZER.to_string());
        self.patch_finalizers(resource, finalizers).await
    }

    async fn remove_finalizer(&self, resource: &ObjectBucket) -> Result<()> {
        if !resource.has_finalizer() {
            return Ok(());
        }
        let finalizers = resource
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != BUCKET_FINALIZER)
            .cloned()
            .collect();
        self.patch_finalizers(resource, finalizers).await
    }

    async fn update_status(&self, key: &ResourceKey, status: &ObjectBucketStatus) -> Result<()> {
        let patch = json!({ "status": status });
        match self
            .api(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                debug!("Skipping status update, ObjectBucket {} is gone", key);
                Ok(())
            }
            Err(e) => {
                Err(e).with_context(|| format!("Failed to update status of ObjectBucket {key}"))
            }
        }
    }
}
