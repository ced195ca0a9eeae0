//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Defaults here can be overridden via environment variables (see
//! [`crate::config::ControllerConfig`]); the naming constants cannot, since
//! idempotent updates depend on them staying stable across restarts.

/// Prefix of the ConfigMap that publishes a bucket's connection details.
/// The full name is this prefix followed by the ObjectBucket name.
pub const CONFIG_NAME_PREFIX: &str = "rook-ceph-object-bucket-";

/// Label on object user secrets naming the user they belong to
pub const CREDENTIAL_USER_LABEL: &str = "user";

/// Finalizer held on an ObjectBucket while the controller owns external state for it
pub const BUCKET_FINALIZER: &str = "ceph.rook.io/object-bucket";

/// Field manager used for every write issued by the controller
pub const FIELD_MANAGER: &str = "object-bucket-controller";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on published ConfigMaps
pub const MANAGED_BY_LABEL_VALUE: &str = "object-bucket-controller";

/// Label on published ConfigMaps naming the owning ObjectBucket
pub const OWNER_LABEL: &str = "ceph.rook.io/object-bucket";

/// Published config data keys
pub const BUCKET_HOST_KEY: &str = "BUCKET_HOST";
pub const BUCKET_PORT_KEY: &str = "BUCKET_PORT";
pub const BUCKET_NAME_KEY: &str = "BUCKET_NAME";
pub const BUCKET_SSL_KEY: &str = "BUCKET_SSL";

/// Default secret data key holding the S3 access key id (Rook object user layout)
pub const DEFAULT_ACCESS_KEY_FIELD: &str = "AccessKey";

/// Default secret data key holding the S3 secret access key (Rook object user layout)
pub const DEFAULT_SECRET_KEY_FIELD: &str = "SecretKey";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default number of concurrent reconciliation workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff ceiling (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default interval between full resyncs of every cached ObjectBucket (seconds).
/// Also the window during which an already published generation is not re-provisioned.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default upper bound for a single call to the Kubernetes API or object store (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Default delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default S3 endpoint (the Rook RGW service in the rook-ceph namespace)
pub const DEFAULT_OBJECT_STORE_ENDPOINT: &str =
    "http://rook-ceph-rgw-my-store.rook-ceph.svc:80";

/// Default S3 region; RGW ignores it but the SDK requires one
pub const DEFAULT_OBJECT_STORE_REGION: &str = "us-east-1";

/// Page size used when emptying a bucket before forced deletion (S3 DeleteObjects limit)
pub const DELETE_OBJECTS_BATCH_SIZE: i32 = 1000;
