//! # Configuration
//!
//! Controller-level settings. Loaded once at startup from environment
//! variables (populated from a ConfigMap via `envFrom` in the deployment) and
//! optionally overridden by command line flags, then passed explicitly into
//! the components that need them.

mod controller;

pub use controller::{BucketDeletionPolicy, ControllerConfig, LogFormat};
