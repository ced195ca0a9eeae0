//! # Object Bucket Controller
//!
//! A Kubernetes controller that provisions S3 buckets for `ObjectBucket`
//! resources and publishes their connection details as ConfigMaps.
//!
//! ## Overview
//!
//! For every `ObjectBucket` the controller:
//!
//! 1. **Resolves the owner credential** - the Secret labelled `user=<spec.objectUser>`
//! 2. **Provisions the bucket** - named after the resource, with the owner's keys
//! 3. **Publishes a ConfigMap** - `BUCKET_HOST`, `BUCKET_PORT`, `BUCKET_NAME`, `BUCKET_SSL`
//! 4. **Deprovisions on delete** - removes the ConfigMap and the bucket
//!
//! Configuration comes from environment variables (see
//! [`ControllerConfig`]); the flags below override them.

use anyhow::Result;
use clap::Parser;

use object_bucket_controller::config::{BucketDeletionPolicy, ControllerConfig, LogFormat};
use object_bucket_controller::runtime;

/// Object Bucket Controller
#[derive(Parser, Debug)]
#[command(name = "object-bucket-controller", version, about, long_about = None)]
struct Args {
    /// Number of reconciliation workers
    #[arg(long)]
    workers: Option<usize>,

    /// Only watch ObjectBuckets in this namespace
    #[arg(long)]
    namespace: Option<String>,

    /// S3 endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    region: Option<String>,

    /// What to do with non-empty buckets on delete: refuse or force
    #[arg(long)]
    deletion_policy: Option<BucketDeletionPolicy>,

    /// Port for metrics and health probes
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log format: json or text
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(workers) = self.workers.filter(|n| *n > 0) {
            config.worker_count = workers;
        }
        if let Some(namespace) = self.namespace {
            config.watch_namespace = Some(namespace);
        }
        if let Some(endpoint) = self.endpoint {
            config.object_store_endpoint = endpoint;
        }
        if let Some(region) = self.region {
            config.object_store_region = region;
        }
        if let Some(policy) = self.deletion_policy {
            config.deletion_policy = policy;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(ControllerConfig::from_env());
    let init = runtime::initialize(config).await?;
    runtime::run(init).await
}
