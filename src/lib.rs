//! Object Bucket Controller Library
//!
//! Watches `ObjectBucket` resources, provisions an S3 bucket for each with
//! its owner's credentials, and publishes the connection details as a
//! ConfigMap next to it. Deleting the resource removes both again.
//!
//! ## Quick Start
//!
//! ```rust
//! use object_bucket_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
