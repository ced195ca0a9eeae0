//! # ObjectBucket Spec
//!
//! The `ObjectBucket` custom resource: a namespaced request for an S3 bucket
//! owned by an existing object store user.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::BUCKET_FINALIZER;
use crate::crd::ObjectBucketStatus;

/// ObjectBucket Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: ceph.rook.io/v1beta1
/// kind: ObjectBucket
/// metadata:
///   name: photos
///   namespace: media
/// spec:
///   objectUser: media-uploader
/// ```
///
/// Once reconciled, the ConfigMap `rook-ceph-object-bucket-photos` in the
/// `media` namespace carries `BUCKET_HOST`, `BUCKET_PORT`, `BUCKET_NAME` and
/// `BUCKET_SSL`.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[kube(
    kind = "ObjectBucket",
    group = "ceph.rook.io",
    version = "v1beta1",
    plural = "objectbuckets",
    shortname = "ob",
    namespaced,
    status = "ObjectBucketStatus",
    printcolumn = r#"{"name":"User", "type":"string", "jsonPath":".spec.objectUser"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSpec {
    /// Name of the object store user that owns the bucket.
    /// The user's access keys are read from the Secret labelled `user=<objectUser>`
    /// in the same namespace.
    pub object_user: String,
}

impl ObjectBucket {
    /// Whether the controller finalizer is present on this resource
    #[must_use]
    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|name| name == BUCKET_FINALIZER))
    }

    /// Whether the resource has been marked for deletion
    #[must_use]
    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// `metadata.generation`, or 0 when the API server has not assigned one
    #[must_use]
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::CustomResourceExt;

    fn bucket(finalizers: Option<Vec<String>>) -> ObjectBucket {
        let mut ob = ObjectBucket::new(
            "photos",
            ObjectBucketSpec {
                object_user: "media-uploader".to_string(),
            },
        );
        ob.metadata.namespace = Some("media".to_string());
        ob.metadata.finalizers = finalizers;
        ob
    }

    #[test]
    fn test_crd_identity() {
        let crd = ObjectBucket::crd();
        assert_eq!(crd.spec.group, "ceph.rook.io");
        assert_eq!(crd.spec.names.kind, "ObjectBucket");
        assert_eq!(crd.spec.names.plural, "objectbuckets");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1beta1");
    }

    #[test]
    fn test_spec_uses_camel_case() {
        let json = serde_json::to_value(&bucket(None).spec).unwrap();
        assert_eq!(json["objectUser"], "media-uploader");
    }

    #[test]
    fn test_has_finalizer() {
        assert!(!bucket(None).has_finalizer());
        assert!(!bucket(Some(vec!["other/finalizer".to_string()])).has_finalizer());
        assert!(bucket(Some(vec![BUCKET_FINALIZER.to_string()])).has_finalizer());
    }

    #[test]
    fn test_is_being_deleted() {
        let mut ob = bucket(None);
        assert!(!ob.is_being_deleted());
        ob.metadata.deletion_timestamp =
            serde_json::from_value(serde_json::json!("2024-05-01T10:00:00Z")).unwrap();
        assert!(ob.is_being_deleted());
    }
}
