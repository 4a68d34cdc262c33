//! The single-flight reload coordinator.
//!
//! Ensures at most one reload is in progress per [`Entry`] at a time.
//! Callers that find a reload already running either **join** it (await
//! its result — used by the mandatory and synchronous-refresh paths of
//! [`crate::CacheSegment::get`]) or **leave** it alone (used by background
//! refresh, which only wants to kick off work, not wait on it).

use crate::entry::{Entry, ReloadOutcome, RefreshHandle, ValueVersion};
use crate::events::CacheEvent;
use resilience_core::{CacheError, EventListeners, MonotonicClock};
use resilience_ratelimiter::LeakyBucket;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

/// `K -> Result<V, E>`, invoked with the owner's reload for a single key.
pub(crate) type Loader<K, V, E> = Arc<dyn Fn(&K) -> Result<V, E> + Send + Sync>;

/// `(&[K], sink) -> Result<(), E>`; the sink is called once per key the
/// reloader managed to produce a fresh value for.
pub(crate) type BulkReloader<K, V, E> =
    Arc<dyn Fn(&[K], &mut dyn FnMut(K, V)) -> Result<(), E> + Send + Sync>;

pub(crate) struct SingleFlightRefresher<K, V, E>
where
    E: Send + Sync,
{
    name: String,
    loader: Loader<K, V, E>,
    reloader: Option<BulkReloader<K, V, E>>,
    failure_bucket: Option<Arc<LeakyBucket>>,
    event_listeners: EventListeners<CacheEvent<E>>,
    clock: MonotonicClock,
}

impl<K, V, E> SingleFlightRefresher<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Send + Sync,
{
    pub(crate) fn new(
        name: String,
        loader: Loader<K, V, E>,
        reloader: Option<BulkReloader<K, V, E>>,
        failure_bucket: Option<Arc<LeakyBucket>>,
        event_listeners: EventListeners<CacheEvent<E>>,
    ) -> Self {
        Self {
            name,
            loader,
            reloader,
            failure_bucket,
            event_listeners,
            clock: MonotonicClock::new(),
        }
    }

    pub(crate) fn has_bulk_reloader(&self) -> bool {
        self.reloader.is_some()
    }

    /// The shared listener set, reused by [`crate::FaultTolerantCache`] and
    /// [`crate::segment::CacheSegment`] to emit `Hit`/`Miss`/`Eviction`
    /// alongside the `Exception` events this type emits itself.
    pub(crate) fn event_listeners(&self) -> &EventListeners<CacheEvent<E>> {
        &self.event_listeners
    }

    /// Notifies the exception listener of a failure that is *not* being
    /// propagated to whoever triggered this reload (background refresh,
    /// a follower that already gave up waiting, etc. still get their own
    /// `Err` back through the single-flight handle; this is purely for
    /// observability of failures the cache itself absorbed).
    fn notify(&self, error: Arc<CacheError<E>>) {
        self.event_listeners.emit(&CacheEvent::Exception {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            error,
        });
    }

    /// Claims `entry`'s refresh lock for this caller, or returns the
    /// in-flight handle already owned by someone else.
    fn claim(entry: &Entry<K, V, E>) -> Result<Arc<RefreshHandle<V, E>>, Arc<RefreshHandle<V, E>>> {
        let mut slot = entry.refresh_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Err(Arc::clone(existing));
        }
        let handle = Arc::new(RefreshHandle::new());
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn release(entry: &Entry<K, V, E>) {
        *entry.refresh_lock.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Runs the owner's reload to completion: invokes the loader (or
    /// short-circuits on an exhausted failure-rate bucket), publishes the
    /// outcome to `handle`, updates `entry.current` on success, and always
    /// clears the lock slot before returning.
    fn own_single(&self, entry: &Entry<K, V, E>, handle: &Arc<RefreshHandle<V, E>>) -> Result<V, CacheError<E>> {
        if let Some(bucket) = &self.failure_bucket {
            if bucket.available_capacity() < 1.0 {
                let err = Arc::new(CacheError::FailureRateLimitExceeded);
                self.notify(Arc::clone(&err));
                handle.publish(ReloadOutcome::Failure(Arc::clone(&err)));
                Self::release(entry);
                return Err((*err).clone());
            }
        }

        match (self.loader)(&entry.key) {
            Ok(value) => {
                let version = ValueVersion {
                    value: value.clone(),
                    written_at_millis: self.clock.now_millis(),
                };
                entry.set_current(version.clone());
                handle.publish(ReloadOutcome::Success(version));
                Self::release(entry);
                Ok(value)
            }
            Err(cause) => {
                if let Some(bucket) = &self.failure_bucket {
                    bucket.flow_in(1.0);
                }
                let err = Arc::new(CacheError::LoaderFailure(Arc::new(cause)));
                self.notify(Arc::clone(&err));
                handle.publish(ReloadOutcome::Failure(Arc::clone(&err)));
                Self::release(entry);
                Err((*err).clone())
            }
        }
    }

    /// Single-key join protocol: becomes the owner if no reload is in
    /// flight, otherwise awaits the owner's result.
    pub(crate) fn refresh_or_join(&self, entry: &Entry<K, V, E>) -> Result<V, CacheError<E>> {
        match Self::claim(entry) {
            Ok(handle) => self.own_single(entry, &handle),
            Err(handle) => handle.join().into_result(),
        }
    }

    /// Single-key leave protocol, for background refresh: becomes the
    /// owner if possible, otherwise returns immediately with no effect.
    /// A skipped entry contributes nothing either way.
    pub(crate) fn refresh_or_leave(&self, entry: &Entry<K, V, E>) {
        if entry.is_evicted() {
            return;
        }
        if let Ok(handle) = Self::claim(entry) {
            let _ = self.own_single(entry, &handle);
        }
    }

    /// Bulk leave protocol: background-only, never propagates a failure to
    /// the caller. Deduplicates `entries` by key, claims as many as
    /// possible, hands the claimed keys to the configured bulk reloader,
    /// and resolves every claimed entry exactly once.
    pub(crate) fn refresh_or_leave_bulk(&self, entries: &[Entry<K, V, E>]) {
        let Some(reloader) = &self.reloader else {
            for entry in entries {
                self.refresh_or_leave(entry);
            }
            return;
        };

        if let Some(bucket) = &self.failure_bucket {
            if bucket.available_capacity() < 1.0 {
                self.notify(Arc::new(CacheError::FailureRateLimitExceeded));
                return;
            }
        }

        let mut deduped: HashMap<K, Entry<K, V, E>> = HashMap::new();
        for entry in entries {
            if !entry.is_evicted() {
                deduped.insert(entry.key.clone(), Arc::clone(entry));
            }
        }

        let mut owned: HashMap<K, (Entry<K, V, E>, Arc<RefreshHandle<V, E>>)> = HashMap::new();
        for (key, entry) in deduped {
            if let Ok(handle) = Self::claim(&entry) {
                owned.insert(key, (entry, handle));
            }
        }
        if owned.is_empty() {
            return;
        }

        let keys: Vec<K> = owned.keys().cloned().collect();
        let now = self.clock.now_millis();
        let result = {
            let owned = &mut owned;
            let mut sink = move |k: K, v: V| {
                if let Some((entry, handle)) = owned.remove(&k) {
                    let version = ValueVersion {
                        value: v,
                        written_at_millis: now,
                    };
                    entry.set_current(version.clone());
                    handle.publish(ReloadOutcome::Success(version));
                    Self::release(&entry);
                }
            };
            (reloader)(&keys, &mut sink)
        };

        let shared_cause: Option<Arc<E>> = match result {
            Ok(()) => None,
            Err(cause) => {
                if let Some(bucket) = &self.failure_bucket {
                    bucket.flow_in(1.0);
                }
                let cause = Arc::new(cause);
                self.notify(Arc::new(CacheError::ReloaderFailure(Some(Arc::clone(&cause)))));
                Some(cause)
            }
        };

        for (_, (entry, handle)) in owned {
            let err = Arc::new(match &shared_cause {
                Some(cause) => CacheError::ReloaderFailure(Some(Arc::clone(cause))),
                None => CacheError::ReloaderFailure(None),
            });
            if shared_cause.is_none() {
                self.notify(Arc::clone(&err));
            }
            handle.publish(ReloadOutcome::Failure(err));
            Self::release(&entry);
        }
    }
}
