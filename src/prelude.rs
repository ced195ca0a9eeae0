//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use object_bucket_controller::prelude::*;
//! ```

// CRD types - most commonly used
pub use crate::crd::*;

// Provider traits - needed for implementing stores and object storage backends
pub use crate::provider::{
    BucketDeletion, BucketEndpoint, BucketResourceStore, ConfigStore, CredentialRecord,
    CredentialStore, ObjectStorage, PublishedConfig, StorageError,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    EventKind, ReconcileOutcome, Reconciler, ReconcilerError, ReconcilerSettings, Stage,
};

pub use crate::config::{BucketDeletionPolicy, ControllerConfig};

pub use crate::runtime::WorkQueue;
