//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_ACCESS_KEY_FIELD, DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS,
    DEFAULT_METRICS_PORT, DEFAULT_OBJECT_STORE_ENDPOINT, DEFAULT_OBJECT_STORE_REGION,
    DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_SECRET_KEY_FIELD,
    DEFAULT_WATCH_RESTART_DELAY_SECS, DEFAULT_WORKER_COUNT,
};

/// What to do with a bucket that still holds objects when its ObjectBucket is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BucketDeletionPolicy {
    /// Leave the bucket in place and surface `BucketNotEmpty` until it is emptied
    #[default]
    Refuse,
    /// Delete every object, then the bucket
    Force,
}

impl BucketDeletionPolicy {
    #[must_use]
    pub fn force_if_non_empty(self) -> bool {
        matches!(self, Self::Force)
    }
}

impl FromStr for BucketDeletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refuse" | "retain-non-empty" => Ok(Self::Refuse),
            "force" | "purge" => Ok(Self::Force),
            other => Err(format!(
                "unknown bucket deletion policy '{other}' (expected 'refuse' or 'force')"
            )),
        }
    }
}

impl fmt::Display for BucketDeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refuse => f.write_str("refuse"),
            Self::Force => f.write_str("force"),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            other => Err(format!("unknown log format '{other}' (expected 'json' or 'text')")),
        }
    }
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Number of reconciliation workers draining the work queue
    pub worker_count: usize,
    /// Exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff ceiling (milliseconds)
    pub backoff_max_ms: u64,
    /// Interval between full resyncs, and the window in which an already
    /// published generation is treated as up to date (seconds)
    pub resync_interval_secs: u64,
    /// Upper bound for a single external call (seconds)
    pub operation_timeout_secs: u64,
    /// Delay before restarting the watch stream after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Restrict the watch to one namespace; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Secret data key holding the access key id
    pub access_key_field: String,
    /// Secret data key holding the secret access key
    pub secret_key_field: String,
    /// S3 endpoint URL, e.g. `http://rook-ceph-rgw-my-store.rook-ceph.svc:80`
    pub object_store_endpoint: String,
    /// S3 region
    pub object_store_region: String,
    /// Deletion policy for non-empty buckets
    pub deletion_policy: BucketDeletionPolicy,
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Fallback log filter when `RUST_LOG` is not set
    pub log_level: String,
    /// Log format
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_namespace: None,
            access_key_field: DEFAULT_ACCESS_KEY_FIELD.to_string(),
            secret_key_field: DEFAULT_SECRET_KEY_FIELD.to_string(),
            object_store_endpoint: DEFAULT_OBJECT_STORE_ENDPOINT.to_string(),
            object_store_region: DEFAULT_OBJECT_STORE_REGION.to_string(),
            deletion_policy: BucketDeletionPolicy::Refuse,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unparseable values fall back to the default for that key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let string = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            worker_count: parse_var(&lookup, "WORKER_COUNT")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.worker_count),
            backoff_start_ms: parse_var(&lookup, "BACKOFF_START_MS").unwrap_or(defaults.backoff_start_ms),
            backoff_max_ms: parse_var(&lookup, "BACKOFF_MAX_MS").unwrap_or(defaults.backoff_max_ms),
            resync_interval_secs: parse_var(&lookup, "RESYNC_INTERVAL_SECS")
                .unwrap_or(defaults.resync_interval_secs),
            operation_timeout_secs: parse_var(&lookup, "OPERATION_TIMEOUT_SECS")
                .filter(|n: &u64| *n > 0)
                .unwrap_or(defaults.operation_timeout_secs),
            watch_restart_delay_secs: parse_var(&lookup, "WATCH_RESTART_DELAY_SECS")
                .unwrap_or(defaults.watch_restart_delay_secs),
            watch_namespace: string("WATCH_NAMESPACE"),
            access_key_field: string("CREDENTIAL_ACCESS_KEY_FIELD")
                .unwrap_or(defaults.access_key_field),
            secret_key_field: string("CREDENTIAL_SECRET_KEY_FIELD")
                .unwrap_or(defaults.secret_key_field),
            object_store_endpoint: string("OBJECT_STORE_ENDPOINT")
                .unwrap_or(defaults.object_store_endpoint),
            object_store_region: string("OBJECT_STORE_REGION")
                .unwrap_or(defaults.object_store_region),
            deletion_policy: parse_var(&lookup, "BUCKET_DELETION_POLICY").unwrap_or(defaults.deletion_policy),
            metrics_port: parse_var(&lookup, "METRICS_PORT").unwrap_or(defaults.metrics_port),
            log_level: string("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: parse_var(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
        }
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff ceiling duration (never below the start value)
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms.max(self.backoff_start_ms))
    }

    #[must_use]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read a variable through `lookup` and parse it, ignoring unparseable values
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
