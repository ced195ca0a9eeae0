use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{DeleteParams, ObjectMeta, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use super::is_not_found;
use crate::constants::{
    CONFIG_NAME_PREFIX, FIELD_MANAGER, MANAGED_BY_LABEL, MANAGED_BY_LABEL_VALUE, OWNER_LABEL,
};
use crate::provider::{ConfigStore, PublishedConfig};

#[derive(Clone)]
pub struct KubeConfigStore {
    client: Client,
}

impl KubeConfigStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn labels(owner: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            MANAGED_BY_LABEL.to_string(),
            MANAGED_BY_LABEL_VALUE.to_string(),
        ),
        (OWNER_LABEL.to_string(), owner.to_string()),
    ])
}

pub(crate) fn to_config_map(config: &PublishedConfig) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(config.name.clone()),
            namespace: Some(config.namespace.clone()),
            labels: Some(labels(&config.owner)),
            ..Default::default()
        },
        data: Some(config.data()),
        ..Default::default()
    }
}

fn from_config_map(namespace: &str, name: &str, cm: &ConfigMap) -> Result<PublishedConfig> {
    let owner = cm
        .metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(OWNER_LABEL).cloned())
        .or_else(|| name.strip_prefix(CONFIG_NAME_PREFIX).map(str::to_string))
        .unwrap_or_default();
    let data = cm.data.clone().unwrap_or_default();
    PublishedConfig::from_data(namespace, name, &owner, &data)
}

#[async_trait]
impl ConfigStore for KubeConfigStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PublishedConfig>> {
        let existing = self
            .api(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get ConfigMap {namespace}/{name}"))?;

        match existing {
            Some(cm) => match from_config_map(namespace, name, &cm) {
                Ok(config) => Ok(Some(config)),
                Err(e) => {
                    // A hand-edited map is still ours to overwrite
                    debug!("ConfigMap {}/{} has unexpected data: {:#}", namespace, name, e);
                    Ok(Some(PublishedConfig {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                        ..Default::default()
                    }))
                }
            },
            None => Ok(None),
        }
    }

    async fn create(&self, config: &PublishedConfig) -> Result<()> {
        self.api(&config.namespace)
            .create(
                &PostParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                },
                &to_config_map(config),
            )
            .await
            .with_context(|| {
                format!(
                    "Failed to create ConfigMap {}/{}",
                    config.namespace, config.name
                )
            })?;
        Ok(())
    }

    async fn update(&self, config: &PublishedConfig) -> Result<()> {
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api(&config.namespace)
            .patch(&config.name, &params, &Patch::Apply(to_config_map(config)))
            .await
            .with_context(|| {
                format!(
                    "Failed to update ConfigMap {}/{}",
                    config.namespace, config.name
                )
            })?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete ConfigMap {namespace}/{name}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublishedConfig {
        PublishedConfig {
            namespace: "media".to_string(),
            name: "rook-ceph-object-bucket-photos".to_string(),
            owner: "photos".to_string(),
            host: "rgw.rook-ceph.svc".to_string(),
            port: 80,
            bucket_name: "photos".to_string(),
            tls: false,
        }
    }

    #[test]
    fn test_config_map_carries_labels_and_data() {
        let cm = to_config_map(&config());
        let labels = cm.metadata.labels.unwrap();
        assert_eq!(labels[MANAGED_BY_LABEL], MANAGED_BY_LABEL_VALUE);
        assert_eq!(labels[OWNER_LABEL], "photos");
        assert_eq!(cm.data.unwrap().len(), 4);
    }

    #[test]
    fn test_config_map_serializes_type_meta_for_apply() {
        let json = serde_json::to_value(to_config_map(&config())).unwrap();
        assert_eq!(json["apiVersion"], "v1");
        assert_eq!(json["kind"], "ConfigMap");
    }

    #[test]
    fn test_owner_falls_back_to_name_prefix() {
        let mut cm = to_config_map(&config());
        cm.metadata.labels = None;
        let parsed = from_config_map("media", "rook-ceph-object-bucket-photos", &cm).unwrap();
        assert_eq!(parsed.owner, "photos");
        assert_eq!(parsed, config());
    }
}
