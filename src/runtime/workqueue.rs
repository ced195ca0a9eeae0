//! # Work Queue
//!
//! Deduplicating queue of resource keys with per-key serialization and
//! rate-limited re-adds.
//!
//! - A key that is already waiting is not queued twice.
//! - A key handed out by [`WorkQueue::get`] is "processing" until
//!   [`WorkQueue::done`]. Adding it meanwhile marks it dirty, and it is queued
//!   again on `done`, so a key is never processed by two workers at once.
//! - [`WorkQueue::add_rate_limited`] re-adds a key after a per-key
//!   exponential backoff that [`WorkQueue::forget`] resets.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::controller::backoff::ExponentialBackoff;
use crate::observability::metrics;

struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys that need processing: everything in `queue` plus re-adds of processing keys
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

pub struct WorkQueue<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    limiter: Mutex<HashMap<K, ExponentialBackoff>>,
    backoff_base: Duration,
    backoff_max: Duration,
    /// Cancels pending delayed adds
    shutdown: CancellationToken,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(backoff_base: Duration, backoff_max: Duration, shutdown: CancellationToken) -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter: Mutex::new(HashMap::new()),
            backoff_base,
            backoff_max,
            shutdown,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn limiter(&self) -> MutexGuard<'_, HashMap<K, ExponentialBackoff>> {
        self.limiter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `key` unless it is already waiting. Ignored after shutdown.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down || !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            // Queued again by `done`
            return;
        }
        state.queue.push_back(key);
        metrics::set_workqueue_depth(state.queue.len());
        drop(state);
        self.notify.notify_one();
    }

    /// Queue `key` once `delay` has elapsed, unless the queue shuts down first
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = queue.shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => queue.add(key),
            }
        });
    }

    /// Queue `key` after its next backoff delay and return that delay
    pub fn add_rate_limited(self: &Arc<Self>, key: K) -> Duration {
        let delay = self
            .limiter()
            .entry(key.clone())
            .or_insert_with(|| ExponentialBackoff::new(self.backoff_base, self.backoff_max))
            .next_backoff();
        trace!(?delay, "Rate-limited re-add");
        self.add_after(key, delay);
        delay
    }

    /// Reset the backoff of `key`
    pub fn forget(&self, key: &K) {
        self.limiter().remove(key);
    }

    /// Rate-limited re-adds of `key` since it was last forgotten
    #[must_use]
    pub fn num_requeues(&self, key: &K) -> u32 {
        self.limiter()
            .get(key)
            .map_or(0, ExponentialBackoff::attempts)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an add between the check and the await is not missed
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::set_workqueue_depth(state.queue.len());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as processed, queueing it again if it was re-added meanwhile
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            metrics::set_workqueue_depth(state.queue.len());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Keys waiting to be handed out
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys, cancel delayed adds and wake every waiting worker.
    /// Keys already queued are still handed out.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}
