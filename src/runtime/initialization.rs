//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, Kubernetes and object store client setup.

use std::sync::Arc;

use anyhow::{Context, Result};
use kube::{api::Api, Client};
use kube_runtime::reflector::{self, store::Writer, Store};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::{ControllerConfig, LogFormat};
use crate::controller::reconciler::{Reconciler, ReconcilerSettings};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{ObjectBucket, ResourceKey};
use crate::observability;
use crate::provider::kubernetes::{KubeBucketStore, KubeConfigStore, KubeCredentialStore};
use crate::provider::s3::S3ObjectStorage;
use crate::runtime::workqueue::WorkQueue;

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the ObjectBucket CRD, cluster-wide or limited to the watched namespace
    pub buckets: Api<ObjectBucket>,
    /// Write half of the ObjectBucket cache, fed by the watch loop
    pub writer: Writer<ObjectBucket>,
    /// Read half of the ObjectBucket cache
    pub reader: Store<ObjectBucket>,
    pub reconciler: Arc<Reconciler>,
    pub queue: Arc<WorkQueue<ResourceKey>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Cancelled on SIGINT/SIGTERM
    pub shutdown: CancellationToken,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("object_bucket_controller={}", config.log_level).into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.log_format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes and object store client creation
/// - Reconciler and work queue setup
/// - Shutdown signal handling
///
/// # Errors
///
/// Returns an error if metrics registration fails or a client cannot be built.
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must happen before any rustls client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    init_tracing(&config);

    info!("Starting Object Bucket Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        workers = config.worker_count,
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        endpoint = %config.object_store_endpoint,
        deletion_policy = ?config.deletion_policy,
        "Controller configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let shutdown = CancellationToken::new();
    // Not ready until the ObjectBucket cache has synced
    let server_state = Arc::new(ServerState::default());

    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, server_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let buckets: Api<ObjectBucket> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    let (reader, writer) = reflector::store();

    let storage = S3ObjectStorage::new(&config.object_store_endpoint, &config.object_store_region)
        .await
        .context("Failed to create object store client")?;

    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeBucketStore::new(client.clone(), reader.clone())),
        Arc::new(KubeCredentialStore::new(client.clone())),
        Arc::new(KubeConfigStore::new(client.clone())),
        Arc::new(storage),
        ReconcilerSettings::from(&config),
    ));

    let queue = Arc::new(WorkQueue::new(
        config.backoff_start_duration(),
        config.backoff_max_duration(),
        shutdown.child_token(),
    ));

    spawn_signal_handler(
        Arc::clone(&server_state),
        Arc::clone(&queue),
        shutdown.clone(),
    );

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        buckets,
        writer,
        reader,
        reconciler,
        queue,
        server_state,
        shutdown,
        config,
    })
}

/// Mark the server not ready and stop the queue on SIGINT/SIGTERM.
/// Workers finish their in-flight reconciliation before exiting.
fn spawn_signal_handler(
    server_state: Arc<ServerState>,
    queue: Arc<WorkQueue<ResourceKey>>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        server_state.set_ready(false);
        queue.shut_down();
        shutdown.cancel();
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
