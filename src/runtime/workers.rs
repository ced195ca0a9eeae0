//! # Workers
//!
//! Reconciliation workers draining the [`WorkQueue`]. The queue hands a key to
//! one worker at a time, so reconciliations of one ObjectBucket never overlap
//! while different ObjectBuckets proceed in parallel.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

use crate::controller::reconciler::Reconciler;
use crate::crd::ResourceKey;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::workqueue::WorkQueue;

/// Spawn `count` workers. Each exits when the queue is shut down and drained,
/// or as soon as `shutdown` is cancelled.
pub fn spawn_workers(
    count: usize,
    queue: &Arc<WorkQueue<ResourceKey>>,
    reconciler: &Arc<Reconciler>,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|id| {
            let queue = Arc::clone(queue);
            let reconciler = Arc::clone(reconciler);
            let shutdown = shutdown.clone();
            let span = tracing::info_span!("controller.worker", worker.id = id);
            tokio::spawn(run_worker(queue, reconciler, shutdown).instrument(span))
        })
        .collect()
}

async fn run_worker(
    queue: Arc<WorkQueue<ResourceKey>>,
    reconciler: Arc<Reconciler>,
    shutdown: CancellationToken,
) {
    debug!("Worker started");
    while let Some(key) = queue.get().await {
        let result = tokio::select! {
            () = shutdown.cancelled() => {
                queue.done(&key);
                break;
            }
            result = reconciler.reconcile_key(&key) => result,
        };

        match result {
            Ok(outcome) => {
                debug!(resource = %key, outcome = ?outcome, "watch.event.reconciled");
                queue.forget(&key);
            }
            Err(error) => {
                handle_reconciliation_error(&queue, &key, &error);
            }
        }
        queue.done(&key);
    }
    info!("Worker stopped");
}
