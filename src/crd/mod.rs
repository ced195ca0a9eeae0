//! # Custom Resource Definitions
//!
//! CRD types for the Object Bucket Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `ObjectBucket` resource and its spec
//! - `status.rs` - Status types for tracking reconciliation state
//! - `key.rs` - Namespace/name identity used by the work queue and stores

mod key;
mod spec;
mod status;

pub use key::ResourceKey;
pub use spec::{ObjectBucket, ObjectBucketSpec};
pub use status::{BucketPhase, Condition, ObjectBucketStatus};
