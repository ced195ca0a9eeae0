//! # Resource Key
//!
//! `namespace/name` identity of an ObjectBucket. The work queue carries keys,
//! never payloads, so repeated events for one resource collapse into a single
//! pending reconciliation.

use std::fmt;

use kube::ResourceExt;

use crate::crd::ObjectBucket;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of a namespaced resource; `None` if the object carries no namespace
    #[must_use]
    pub fn from_resource(resource: &ObjectBucket) -> Option<Self> {
        let namespace = resource.namespace()?;
        Some(Self::new(namespace, resource.name_any()))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ObjectBucketSpec;

    #[test]
    fn test_key_from_namespaced_resource() {
        let mut ob = ObjectBucket::new(
            "photos",
            ObjectBucketSpec {
                object_user: "alice".to_string(),
            },
        );
        assert_eq!(ResourceKey::from_resource(&ob), None);

        ob.metadata.namespace = Some("media".to_string());
        let key = ResourceKey::from_resource(&ob).unwrap();
        assert_eq!(key, ResourceKey::new("media", "photos"));
        assert_eq!(key.to_string(), "media/photos");
    }
}
