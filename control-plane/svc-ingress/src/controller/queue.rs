use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Per-item exponential failure backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug)]
pub struct ExponentialBackoff<T> {
    base: Duration,
    max: Duration,
    failures: HashMap<T, u32>,
}

impl<T: Eq + Hash + Clone> ExponentialBackoff<T> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: HashMap::new(),
        }
    }

    /// Delay for the next retry of `item`; records one more failure.
    pub fn when(&mut self, item: &T) -> Duration {
        let failures = self.failures.entry(item.clone()).or_insert(0);
        let exp = *failures;
        *failures = failures.saturating_add(1);
        self.base
            .checked_mul(2u32.saturating_pow(exp))
            .map_or(self.max, |d| d.min(self.max))
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.failures.get(item).copied().unwrap_or(0)
    }

    pub fn forget(&mut self, item: &T) {
        self.failures.remove(item);
    }
}

struct State<T> {
    queue: VecDeque<T>,
    // queued or marked for redelivery
    dirty: HashSet<T>,
    processing: HashSet<T>,
    backoff: ExponentialBackoff<T>,
    shutting_down: bool,
}

struct Inner<T> {
    name: String,
    state: Mutex<State<T>>,
    notify: Notify,
    token: CancellationToken,
}

/// Deduplicating, rate-limited work queue.
///
/// An item is held by at most one consumer at a time. Adding an item that is
/// already queued is a no-op; adding one that is being processed marks it
/// dirty, and it is queued again once its [`Lease`] is released.
pub struct WorkQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WorkQueue<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    pub fn new(name: impl Into<String>, backoff: ExponentialBackoff<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    backoff,
                    shutting_down: false,
                }),
                notify: Notify::new(),
                token: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, item: T) {
        {
            let mut st = self.lock();
            if st.shutting_down || st.dirty.contains(&item) {
                return;
            }
            st.dirty.insert(item.clone());
            if st.processing.contains(&item) {
                trace!(queue = %self.inner.name, ?item, "marked dirty while in flight");
                return;
            }
            st.queue.push_back(item);
        }
        self.inner.notify.notify_one();
    }

    /// Wait for the next item. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<Lease<T>> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.lock();
                if st.shutting_down {
                    return None;
                }
                if let Some(item) = st.queue.pop_front() {
                    st.processing.insert(item.clone());
                    st.dirty.remove(&item);
                    return Some(Lease {
                        queue: self.clone(),
                        item,
                    });
                }
            }
            notified.await;
        }
    }

    /// Release `item`, queueing it again if it was re-added meanwhile.
    pub fn done(&self, item: &T) {
        {
            let mut st = self.lock();
            st.processing.remove(item);
            if st.shutting_down || !st.dirty.contains(item) {
                return;
            }
            st.queue.push_back(item.clone());
        }
        self.inner.notify.notify_one();
    }

    pub fn add_after(&self, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = self.clone();
        let token = self.inner.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(item),
            }
        });
    }

    /// Re-add `item` after its backoff delay and count one more requeue.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.lock().backoff.when(&item);
        trace!(queue = %self.inner.name, ?item, ?delay, "rate limited requeue");
        self.add_after(item, delay);
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.lock().backoff.num_requeues(item)
    }

    pub fn forget(&self, item: &T) {
        self.lock().backoff.forget(item);
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Wake every waiting consumer with `None` and drop pending delayed adds.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.inner.token.cancel();
        self.inner.notify.notify_waiters();
    }
}

/// Exclusive hold on one queue item; releases it via `done` when dropped.
pub struct Lease<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    queue: WorkQueue<T>,
    item: T,
}

impl<T> Lease<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    pub fn item(&self) -> &T {
        &self.item
    }
}

impl<T> Drop for Lease<T>
where
    T: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
{
    fn drop(&mut self) {
        self.queue.done(&self.item);
    }
}
