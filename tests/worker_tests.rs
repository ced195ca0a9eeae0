//! # Worker Integration Tests
//!
//! Runs the work queue and reconciliation workers against in-memory stores.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use object_bucket_controller::crd::{BucketPhase, ResourceKey};
use object_bucket_controller::runtime::{spawn_workers, WorkQueue};
use tokio_util::sync::CancellationToken;

fn queue(token: &CancellationToken) -> Arc<WorkQueue<ResourceKey>> {
    Arc::new(WorkQueue::new(
        Duration::from_millis(10),
        Duration::from_millis(100),
        token.child_token(),
    ))
}

/// Poll `condition` until it holds or a generous deadline passes
async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_duplicate_events_provision_once_across_workers() {
    let resource = object_bucket("photos", "alice", 1);
    let h = Harness::new().with_resource(&resource);
    let token = CancellationToken::new();
    let q = queue(&token);
    let key = ResourceKey::new(NAMESPACE, "photos");

    for _ in 0..5 {
        q.add(key.clone());
    }
    let workers = spawn_workers(4, &q, &h.reconciler, &token);
    for _ in 0..5 {
        q.add(key.clone());
    }

    assert!(eventually(|| h.configs.len() == 1).await);
    assert!(eventually(|| q.is_empty()).await);

    q.shut_down();
    token.cancel();
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(h.storage.creates.load(Ordering::SeqCst), 1);
    assert_eq!(h.configs.creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_reconciliation_is_retried_until_it_converges() {
    let resource = object_bucket("photos", "alice", 1);
    let h = Harness::new();
    h.buckets.insert(resource);
    let token = CancellationToken::new();
    let q = queue(&token);
    let key = ResourceKey::new(NAMESPACE, "photos");

    let workers = spawn_workers(2, &q, &h.reconciler, &token);
    q.add(key.clone());

    // No credential yet: the key keeps coming back with backoff
    assert!(eventually(|| q.num_requeues(&key) >= 2).await);
    assert_eq!(h.configs.len(), 0);

    h.secrets
        .insert(credential_secret("alice", "alice", "AK-alice", "s3cr3t"));
    assert!(eventually(|| h.configs.len() == 1).await);
    assert!(
        eventually(|| h.buckets.status(&key).and_then(|s| s.phase)
            == Some(BucketPhase::Published))
        .await
    );
    // Success resets the backoff
    assert!(eventually(|| q.num_requeues(&key) == 0).await);

    q.shut_down();
    token.cancel();
    for worker in workers {
        worker.await.unwrap();
    }
}

#[tokio::test]
async fn test_workers_exit_on_shutdown() {
    let h = Harness::new();
    let token = CancellationToken::new();
    let q = queue(&token);

    let workers = spawn_workers(3, &q, &h.reconciler, &token);
    assert_eq!(workers.len(), 3);

    q.shut_down();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker exits")
            .unwrap();
    }
}
