//! # Reconciler
//!
//! Turns ObjectBucket lifecycle events into external state.
//!
//! ## Module Structure
//!
//! - `types.rs` - `Reconciler`, `ReconcilerError`, outcomes and settings
//! - `credentials.rs` - Owner credential lookup
//! - `provision.rs` - Bucket name rules and bucket creation
//! - `publish.rs` - Connection ConfigMap publication
//! - `deprovision.rs` - Config and bucket removal on delete
//! - `status.rs` - Status construction
//! - `reconcile.rs` - Pipeline orchestration

pub mod credentials;
pub mod deprovision;
pub mod provision;
pub mod publish;
mod reconcile;
pub mod status;
mod types;

pub use credentials::{resolve_credential, CredentialFields};
pub use deprovision::deprovision;
pub use provision::{bucket_name_for, ensure_bucket, validate_bucket_name};
pub use publish::{config_name, publish_config, unpublish_config};
pub use types::{
    EventKind, ReconcileOutcome, Reconciler, ReconcilerError, ReconcilerSettings, Stage,
};
