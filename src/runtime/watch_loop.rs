//! # Watch Loop
//!
//! Watches ObjectBucket resources, mirrors them into the reflector cache read
//! by the reconciler, and turns every change into a queued [`ResourceKey`].
//!
//! Events carry keys only. Workers always reconcile the newest cached
//! snapshot, so a burst of updates to one resource collapses into a single
//! reconciliation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::Api;
use kube_runtime::reflector::{self, store::Writer, Store};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

use crate::controller::server::ServerState;
use crate::crd::{ObjectBucket, ResourceKey};
use crate::observability;
use crate::runtime::error_policy::handle_watch_stream_error;
use crate::runtime::workqueue::WorkQueue;

/// Settings of the watch loop taken from the controller configuration
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    /// Interval at which every cached ObjectBucket is queued again
    pub resync_interval: Duration,
    /// Pause after watch errors that do not clear by themselves
    pub restart_delay: Duration,
}

/// Run the watch loop until `shutdown` is cancelled or the watch stream ends
///
/// The server is marked ready once the initial list has been cached.
///
/// # Errors
///
/// Currently infallible; watch errors are logged and retried with backoff.
pub async fn run_watch_loop(
    api: Api<ObjectBucket>,
    writer: Writer<ObjectBucket>,
    reader: Store<ObjectBucket>,
    queue: Arc<WorkQueue<ResourceKey>>,
    server_state: Arc<ServerState>,
    settings: WatchSettings,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let watch_span = tracing::span!(
        tracing::Level::INFO,
        "controller.watch",
        operation = "watch_loop"
    );
    watch(api, writer, reader, queue, server_state, settings, shutdown)
        .instrument(watch_span)
        .await;
    info!("Controller stopped gracefully");
    Ok(())
}

async fn watch(
    api: Api<ObjectBucket>,
    writer: Writer<ObjectBucket>,
    reader: Store<ObjectBucket>,
    queue: Arc<WorkQueue<ResourceKey>>,
    server_state: Arc<ServerState>,
    settings: WatchSettings,
    shutdown: CancellationToken,
) {
    info!("Starting controller watch loop...");

    let stream = reflector::reflector(writer, watcher::watcher(api, watcher::Config::default()))
        .default_backoff();
    let mut stream = std::pin::pin!(stream);

    let mut resync = tokio::time::interval(settings.resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial list already queues everything
    resync.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Shutdown requested, exiting watch loop");
                break;
            }
            _ = resync.tick() => {
                let cached = reader.state();
                debug!("Periodic resync of {} cached ObjectBuckets", cached.len());
                for resource in cached {
                    if let Some(key) = ResourceKey::from_resource(&resource) {
                        queue.add(key);
                        observability::metrics::increment_requeues_total("resync");
                    }
                }
            }
            event = stream.next() => match event {
                Some(Ok(event)) => handle_event(event, &queue, &server_state),
                Some(Err(e)) => {
                    handle_watch_stream_error(&e.to_string(), settings.restart_delay, &shutdown)
                        .await;
                }
                None => {
                    warn!("Controller watch stream ended");
                    break;
                }
            },
        }
    }
}

fn handle_event(
    event: Event<ObjectBucket>,
    queue: &WorkQueue<ResourceKey>,
    server_state: &ServerState,
) {
    match event {
        Event::Apply(resource) | Event::InitApply(resource) => {
            enqueue(&resource, queue, "apply");
        }
        Event::Delete(resource) => {
            enqueue(&resource, queue, "delete");
        }
        Event::Init => {
            debug!("Watch (re)listing ObjectBuckets");
        }
        Event::InitDone => {
            if !server_state
                .is_ready
                .load(std::sync::atomic::Ordering::Relaxed)
            {
                info!("ObjectBucket cache synced, controller is ready");
            }
            server_state.set_ready(true);
        }
    }
}

fn enqueue(resource: &ObjectBucket, queue: &WorkQueue<ResourceKey>, event: &str) {
    match ResourceKey::from_resource(resource) {
        Some(key) => {
            trace!(resource = %key, event, "watch.event.received");
            queue.add(key);
        }
        None => warn!(event, "Ignoring ObjectBucket without a namespace"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ObjectBucketSpec;

    fn bucket(namespace: &str, name: &str) -> ObjectBucket {
        let mut ob = ObjectBucket::new(
            name,
            ObjectBucketSpec {
                object_user: "alice".to_string(),
            },
        );
        ob.metadata.namespace = Some(namespace.to_string());
        ob
    }

    fn queue() -> WorkQueue<ResourceKey> {
        WorkQueue::new(
            Duration::from_secs(1),
            Duration::from_secs(10),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_events_enqueue_keys_once() {
        let q = queue();
        let state = ServerState::default();

        handle_event(Event::InitApply(bucket("media", "photos")), &q, &state);
        handle_event(Event::Apply(bucket("media", "photos")), &q, &state);
        handle_event(Event::Delete(bucket("media", "videos")), &q, &state);

        assert_eq!(q.len(), 2);
        assert_eq!(q.get().await, Some(ResourceKey::new("media", "photos")));
        assert_eq!(q.get().await, Some(ResourceKey::new("media", "videos")));
    }

    #[test]
    fn test_init_done_marks_ready() {
        let q = queue();
        let state = ServerState::default();

        handle_event(Event::Init, &q, &state);
        assert!(!state.is_ready.load(std::sync::atomic::Ordering::Relaxed));

        handle_event(Event::InitDone, &q, &state);
        assert!(state.is_ready.load(std::sync::atomic::Ordering::Relaxed));
        assert!(q.is_empty());
    }

    #[test]
    fn test_resource_without_namespace_is_ignored() {
        let q = queue();
        let mut ob = bucket("media", "photos");
        ob.metadata.namespace = None;
        handle_event(Event::Apply(ob), &q, &ServerState::default());
        assert!(q.is_empty());
    }
}
