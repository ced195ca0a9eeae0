use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use crate::provider::CredentialStore;

/// Lists credential Secrets straight from the API server so a freshly
/// created user Secret is visible on the next retry.
#[derive(Clone)]
pub struct KubeCredentialStore {
    client: Client,
}

impl KubeCredentialStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn list_by_label(
        &self,
        namespace: &str,
        label: &str,
        value: &str,
    ) -> Result<Vec<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let selector = format!("{label}={value}");
        let secrets = api
            .list(&ListParams::default().labels(&selector))
            .await
            .with_context(|| format!("Failed to list Secrets in {namespace} with {selector}"))?;

        debug!(
            namespace = namespace,
            selector = %selector,
            count = secrets.items.len(),
            "Listed credential secrets"
        );
        Ok(secrets.items)
    }
}
