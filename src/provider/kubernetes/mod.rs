//! # Kubernetes Adapters
//!
//! API server implementations of the store traits.
//!
//! - `buckets.rs` - [`KubeBucketStore`]: reflector-backed reads, finalizer and status patches
//! - `secrets.rs` - [`KubeCredentialStore`]: label-selected Secret listing
//! - `configmaps.rs` - [`KubeConfigStore`]: connection ConfigMaps

mod buckets;
mod configmaps;
mod secrets;

pub use buckets::KubeBucketStore;
pub use configmaps::KubeConfigStore;
pub use secrets::KubeCredentialStore;

/// Whether `err` is a 404 from the API server
pub(crate) fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}
