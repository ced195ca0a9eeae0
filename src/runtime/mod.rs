//! # Runtime
//!
//! Controller runtime: initialization, the watch loop feeding the work queue,
//! the reconciliation workers draining it, and the error policy between them.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
pub mod workers;
pub mod workqueue;

use tracing::{info, warn};

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::{run_watch_loop, WatchSettings};
pub use workers::spawn_workers;
pub use workqueue::WorkQueue;

/// Run the controller until shutdown
///
/// Starts the workers, runs the watch loop in the foreground, then drains
/// the queue and waits for in-flight reconciliations.
///
/// # Errors
///
/// Returns an error if the watch loop fails.
pub async fn run(init: InitializationResult) -> Result<(), anyhow::Error> {
    let InitializationResult {
        buckets,
        writer,
        reader,
        reconciler,
        queue,
        server_state,
        shutdown,
        config,
        ..
    } = init;

    let workers = spawn_workers(config.worker_count, &queue, &reconciler, &shutdown);
    info!("Started {} reconciliation workers", workers.len());

    let settings = WatchSettings {
        resync_interval: config.resync_interval(),
        restart_delay: config.watch_restart_delay(),
    };
    let result = run_watch_loop(
        buckets,
        writer,
        reader,
        queue.clone(),
        server_state.clone(),
        settings,
        shutdown.clone(),
    )
    .await;

    // The watch loop also returns when its stream ends; stop everything with it
    server_state.set_ready(false);
    queue.shut_down();
    shutdown.cancel();

    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Worker task failed: {}", e);
        }
    }
    info!("All workers stopped");
    result
}
