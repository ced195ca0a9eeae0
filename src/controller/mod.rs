//! # Controller
//!
//! Core controller modules for the Object Bucket Controller.
//!
//! - `backoff`: Exponential backoff for retries
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
