//! # Error Policy
//!
//! Error handling and backoff logic for the workers and the watch loop.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::controller::reconciler::ReconcilerError;
use crate::crd::ResourceKey;
use crate::observability;
use crate::runtime::workqueue::WorkQueue;

/// Handle a failed reconciliation of `key`
///
/// Retryable errors are re-queued with the key's exponential backoff.
/// Terminal errors reset the backoff and are not retried; the next spec
/// change brings the key back through the watch.
///
/// Returns the retry delay, or `None` for terminal errors.
pub fn handle_reconciliation_error(
    queue: &Arc<WorkQueue<ResourceKey>>,
    key: &ResourceKey,
    error: &ReconcilerError,
) -> Option<Duration> {
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.worker.reconciliation_error",
        resource.namespace = %key.namespace,
        resource.name = %key.name,
        stage = %error.stage(),
        error = %error
    );
    let _error_guard = error_span.enter();

    if !error.is_retryable() {
        queue.forget(key);
        warn!(
            "⏸️  Terminal {} failure for {}, waiting for a spec change: {}",
            error.kind(),
            key,
            error
        );
        return None;
    }

    error!("Reconciliation error for {}: {}", key, error);

    let delay = queue.add_rate_limited(key.clone());
    let attempts = queue.num_requeues(key);
    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "🔄 Retrying with exponential backoff: {:?} (attempt: {}, trigger source: error-backoff)",
        delay, attempts
    );
    info!(
        "📅 Next retry scheduled: {} (in {:?}, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        delay
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Some(delay)
}

/// Failure classes of the ObjectBucket watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401/403: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429: API server storage reinitializing
    Throttled,
    /// 404: CRD not installed or removed
    NotFound,
    Other,
}

/// Classify a watch error by its rendered message
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorClass {
    // 404 first: a plain-text 404 surfaces as a serde error mentioning WatchFailed
    if error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found")
    {
        WatchErrorClass::NotFound
    } else if error_string.contains("401")
        || error_string.contains("403")
        || error_string.contains("Unauthorized")
        || error_string.contains("Forbidden")
    {
        WatchErrorClass::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Log a watch stream error and pause before the watcher retries.
/// The watcher's own backoff handles reconnection; the pause only applies
/// to errors that will not clear by themselves quickly.
pub async fn handle_watch_stream_error(
    error_string: &str,
    restart_delay: Duration,
    shutdown: &CancellationToken,
) -> WatchErrorClass {
    let class = classify_watch_error(error_string);
    let pause = {
        let error_span = tracing::span!(
            tracing::Level::WARN,
            "controller.watch.error",
            error = %error_string
        );
        let _error_guard = error_span.enter();
        log_watch_error(class, error_string, restart_delay)
    };

    if let Some(pause) = pause {
        tokio::select! {
            () = shutdown.cancelled() => {}
            () = tokio::time::sleep(pause) => {}
        }
    }
    class
}

fn log_watch_error(
    class: WatchErrorClass,
    error_string: &str,
    restart_delay: Duration,
) -> Option<Duration> {
    match class {
        WatchErrorClass::Unauthorized => {
            error!("❌ Watch authentication failed - RBAC may have been revoked or token expired");
            error!("🔍 Verify the controller ServiceAccount can list and watch objectbuckets.ceph.rook.io:");
            error!(
                "      kubectl auth can-i watch objectbuckets.ceph.rook.io --as=system:serviceaccount:<namespace>:object-bucket-controller --all-namespaces"
            );
            warn!(
                "⏳ Waiting {:?} before retrying watch (RBAC may need time to propagate)...",
                restart_delay
            );
            Some(restart_delay)
        }
        WatchErrorClass::Expired => {
            warn!("Watch resource version expired (410) - the watch will relist");
            None
        }
        WatchErrorClass::Throttled => {
            warn!("API server storage reinitializing (429), backing off before retry");
            None
        }
        WatchErrorClass::NotFound => {
            warn!(
                "ObjectBucket CRD not found (404) - install it with `crdgen | kubectl apply -f -`. Error: {}",
                error_string
            );
            Some(restart_delay)
        }
        WatchErrorClass::Other => {
            error!("Controller stream error: {}", error_string);
            Some(restart_delay)
        }
    }
}
