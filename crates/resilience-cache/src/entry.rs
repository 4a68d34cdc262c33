//! Per-key cache entries and the single-flight completion handle.

use resilience_core::CacheError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// An immutable `(value, written_at)` pair. A fresh version is produced on
/// every successful reload; `written_at_millis` comes from
/// [`resilience_core::MonotonicClock`].
#[derive(Clone)]
pub(crate) struct ValueVersion<V> {
    pub(crate) value: V,
    pub(crate) written_at_millis: u64,
}

/// The result an owner publishes to a [`RefreshHandle`], observed by
/// followers through the same `Arc` the owner holds.
pub(crate) enum ReloadOutcome<V, E> {
    Success(ValueVersion<V>),
    Failure(Arc<CacheError<E>>),
}

impl<V: Clone, E> Clone for ReloadOutcome<V, E> {
    fn clone(&self) -> Self {
        match self {
            ReloadOutcome::Success(version) => ReloadOutcome::Success(version.clone()),
            ReloadOutcome::Failure(error) => ReloadOutcome::Failure(Arc::clone(error)),
        }
    }
}

impl<V: Clone, E> ReloadOutcome<V, E> {
    pub(crate) fn into_result(self) -> Result<V, CacheError<E>> {
        match self {
            ReloadOutcome::Success(version) => Ok(version.value),
            ReloadOutcome::Failure(error) => Err((*error).clone()),
        }
    }
}

/// A one-shot completion slot for a single reload, shared between the
/// owner and its followers.
///
/// Maintained with a mutex+condvar pair plus the `Option` itself acting as
/// the "published" flag, rather than lock-free CAS: the mutex is held only
/// for the instant of publishing or observing the result, never across the
/// loader call itself.
pub(crate) struct RefreshHandle<V, E> {
    state: Mutex<Option<ReloadOutcome<V, E>>>,
    condvar: Condvar,
}

impl<V, E> RefreshHandle<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    /// Publishes the outcome and wakes every follower waiting in [`Self::join`].
    /// Must be called at most once per handle.
    pub(crate) fn publish(&self, outcome: ReloadOutcome<V, E>) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(outcome);
        self.condvar.notify_all();
    }

    /// Blocks the calling thread until the owner publishes a result.
    pub(crate) fn join(&self) -> ReloadOutcome<V, E>
    where
        V: Clone,
    {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        while guard.is_none() {
            guard = self.condvar.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        guard.clone().expect("state was just observed to be Some")
    }
}

/// One record per present (or just-evicted-but-in-flight) key.
pub(crate) struct EntryInner<K, V, E> {
    pub(crate) key: K,
    current: Mutex<Option<ValueVersion<V>>>,
    pub(crate) refresh_lock: Mutex<Option<Arc<RefreshHandle<V, E>>>>,
    evicted: AtomicBool,
}

impl<K, V, E> EntryInner<K, V, E> {
    pub(crate) fn new(key: K) -> Self {
        Self {
            key,
            current: Mutex::new(None),
            refresh_lock: Mutex::new(None),
            evicted: AtomicBool::new(false),
        }
    }

    pub(crate) fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_evicted(&self) -> bool {
        self.evicted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_current(&self, version: ValueVersion<V>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(version);
    }

    pub(crate) fn current_value(&self) -> Option<V>
    where
        V: Clone,
    {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|v| v.value.clone())
    }

    pub(crate) fn written_at_millis(&self) -> Option<u64> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|v| v.written_at_millis)
    }

    pub(crate) fn has_current(&self) -> bool {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

pub(crate) type Entry<K, V, E> = Arc<EntryInner<K, V, E>>;
