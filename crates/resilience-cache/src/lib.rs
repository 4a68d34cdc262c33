//! A keyed cache that prefers serving a somewhat stale but valid entry
//! over propagating a reload failure.
//!
//! Lookups are tiered by freshness horizon (`asynchronous_refresh_after_write`
//! < `refresh_after_write` < `expire_after_write`): a value past the
//! background-refresh horizon is served immediately while a reload runs on
//! the configured [`resilience_executor::Executor`]; a value past the
//! foreground-refresh horizon is only served if a synchronous reload
//! attempt fails; a value past the hard-expire horizon is never served.
//! Concurrent reloads of the same key are single-flighted: one caller owns
//! the load, the rest observe its result.
//!
//! # Examples
//!
//! ```
//! use resilience_cache::CacheConfigBuilder;
//!
//! let cache = CacheConfigBuilder::new()
//!     .maximum_size(1_000)
//!     .loader(|id: &u64| -> Result<String, std::convert::Infallible> {
//!         Ok(format!("user-{id}"))
//!     })
//!     .build();
//!
//! assert_eq!(cache.get(&7).unwrap(), "user-7");
//! ```

mod config;
mod entry;
mod events;
mod list;
mod queue;
mod refresher;
mod segment;

pub use config::CacheConfigBuilder;
pub use events::CacheEvent;
pub use resilience_core::CacheError;

use queue::RefreshQueue;
use refresher::SingleFlightRefresher;
use segment::{CacheSegment, GetAction};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;

/// A keyed cache with tiered freshness and single-flight reload
/// coordination. See the crate-level docs for the freshness model.
pub struct FaultTolerantCache<K, V, E>
where
    E: Send + Sync,
{
    segments: Vec<Arc<CacheSegment<K, V, E>>>,
    refresher: Arc<SingleFlightRefresher<K, V, E>>,
    queue: Arc<RefreshQueue<K, V, E>>,
    name: String,
}

impl<K, V, E> FaultTolerantCache<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Starts building a cache. `loader` is the only required setting.
    pub fn builder() -> CacheConfigBuilder<K, V, E> {
        CacheConfigBuilder::new()
    }

    pub(crate) fn from_parts(
        segments: Vec<Arc<CacheSegment<K, V, E>>>,
        refresher: Arc<SingleFlightRefresher<K, V, E>>,
        queue: Arc<RefreshQueue<K, V, E>>,
        name: String,
    ) -> Self {
        Self {
            segments,
            refresher,
            queue,
            name,
        }
    }

    fn segment_for(&self, key: &K) -> &Arc<CacheSegment<K, V, E>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.segments.len();
        &self.segments[index]
    }

    fn emit_hit(&self) {
        self.refresher.event_listeners().emit(&CacheEvent::Hit {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    fn emit_miss(&self) {
        self.refresher.event_listeners().emit(&CacheEvent::Miss {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Returns a value for `key`, loading or reloading it as needed.
    ///
    /// Propagates a loader failure only when no current value exists yet,
    /// or the current value is hard-expired; in every other case a reload
    /// failure is absorbed (and sent to the exception listener) while the
    /// stale value is returned.
    pub fn get(&self, key: &K) -> Result<V, CacheError<E>> {
        match self.segment_for(key).get(key) {
            GetAction::Serve(value) => {
                self.emit_hit();
                Ok(value)
            }
            GetAction::MandatoryReload(entry) => {
                self.emit_miss();
                self.refresher.refresh_or_join(&entry)
            }
            GetAction::ServeAndEnqueue(entry, value) => {
                self.emit_hit();
                self.queue.add(entry);
                Ok(value)
            }
            GetAction::ServeOrSyncRefresh(entry, value) => {
                self.emit_hit();
                Ok(self.refresher.refresh_or_join(&entry).unwrap_or(value))
            }
        }
    }

    /// Returns a value for `key` if one is present and not hard-expired,
    /// without ever triggering a reload.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.segment_for(key).get_if_present(key)
    }

    /// Removes `key`, returning whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.segment_for(key).invalidate(key)
    }

    /// Removes every key in `keys`, returning the number that were present.
    pub fn invalidate_all_keys(&self, keys: impl IntoIterator<Item = K>) -> usize {
        keys.into_iter().filter(|k| self.invalidate(k)).count()
    }

    /// Removes every entry from the cache.
    pub fn invalidate_all(&self) {
        for segment in &self.segments {
            segment.invalidate_all();
        }
    }

    /// Refreshes every entry that is past a refresh horizon (sync or
    /// async), synchronously draining the work from the calling thread.
    /// Never propagates errors: failures go only to the exception listener.
    pub fn refresh(&self) {
        self.run_sweep(false);
    }

    /// Like [`Self::refresh`], but enqueues every non-hard-expired entry
    /// regardless of freshness.
    pub fn refresh_now(&self) {
        self.run_sweep(true);
    }

    fn run_sweep(&self, all: bool) {
        let mut entries = Vec::new();
        for segment in &self.segments {
            entries.extend(segment.collect_entries_to_refresh(all));
        }
        if entries.is_empty() {
            return;
        }
        self.queue.add_all_no_run(entries);
        self.queue.run();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn miss_then_hit_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .loader(move |k: &String| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{k}v"))
            })
            .build();

        assert_eq!(cache.get(&"a".to_string()).unwrap(), "av");
        assert_eq!(cache.get(&"a".to_string()).unwrap(), "av");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn eviction_order_follows_lru() {
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .maximum_size(5)
            .concurrency_level(1)
            .loader(|k: &String| Ok(format!("{k}v")))
            .build();

        for i in 0..7 {
            cache.get(&format!("a{i}")).unwrap();
        }
        assert!(cache.get_if_present(&"a0".to_string()).is_none());
        assert!(cache.get_if_present(&"a1".to_string()).is_none());
        for i in 2..7 {
            assert!(cache.get_if_present(&format!("a{i}")).is_some());
        }

        cache.get(&"a2".to_string()).unwrap();
        assert!(cache.get_if_present(&"a3".to_string()).is_some());
        cache.get(&"a7".to_string()).unwrap();
        cache.get(&"a8".to_string()).unwrap();

        assert!(cache.get_if_present(&"a0".to_string()).is_none());
        assert!(cache.get_if_present(&"a1".to_string()).is_none());
        assert!(cache.get_if_present(&"a4".to_string()).is_none());
        assert!(cache.get_if_present(&"a5".to_string()).is_none());
        for k in ["a2", "a3", "a6", "a7", "a8"] {
            assert!(cache.get_if_present(&k.to_string()).is_some());
        }
    }

    #[test]
    fn soft_expiry_serves_stale_value_hard_expiry_hides_it() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .refresh_after_write(Duration::from_millis(60))
            .expire_after_write(Duration::from_millis(140))
            .loader(move |k: &String| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{k}v"))
            })
            .build();

        cache.get(&"a0".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(
            cache.get_if_present(&"a0".to_string()),
            Some("a0v".to_string())
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        thread::sleep(Duration::from_millis(80));
        assert!(cache.get_if_present(&"a0".to_string()).is_none());
    }

    #[test]
    fn invalidate_forces_a_reload_on_next_get() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .loader(move |k: &String| {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok(format!("{k}v"))
            })
            .build();

        cache.get(&"a".to_string()).unwrap();
        assert!(cache.invalidate(&"a".to_string()));
        assert!(!cache.invalidate(&"a".to_string()));
        cache.get(&"a".to_string()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mandatory_load_failure_propagates_when_no_current_value_exists() {
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .loader(|_: &String| Err("boom".to_string()))
            .build();
        let err = cache.get(&"a".to_string()).unwrap_err();
        assert!(err.is_loader_failure());
    }

    #[test]
    fn sync_refresh_failure_falls_back_to_the_stale_value() {
        let should_fail = Arc::new(AtomicUsize::new(0));
        let should_fail2 = Arc::clone(&should_fail);
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .refresh_after_write(Duration::from_millis(20))
            .loader(move |k: &String| {
                if should_fail2.load(Ordering::SeqCst) > 0 {
                    Err("downstream unavailable".to_string())
                } else {
                    Ok(format!("{k}v"))
                }
            })
            .build();

        cache.get(&"a".to_string()).unwrap();
        should_fail.store(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get(&"a".to_string()).unwrap(), "av");
    }

    #[test]
    fn exception_listener_observes_async_refresh_failures_while_get_stays_stale() {
        let notified = Arc::new(Mutex::new(0usize));
        let notified2 = Arc::clone(&notified);
        let fail_after_first = Arc::new(AtomicUsize::new(0));
        let fail_after_first2 = Arc::clone(&fail_after_first);
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .asynchronous_refresh_after_write(Duration::from_millis(10))
            .refresh_after_write(Duration::from_secs(60))
            .exception_listener(move |_err| {
                *notified2.lock().unwrap() += 1;
            })
            .loader(move |k: &String| {
                if fail_after_first2.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(format!("{k}v"))
                } else {
                    Err("downstream unavailable".to_string())
                }
            })
            .build();

        assert_eq!(cache.get(&"a".to_string()).unwrap(), "av");
        thread::sleep(Duration::from_millis(30));
        // Past the async horizon: served immediately, reload runs and fails
        // in the background without the caller ever seeing an error.
        assert_eq!(cache.get(&"a".to_string()).unwrap(), "av");
        thread::sleep(Duration::from_millis(50));
        assert_eq!(*notified.lock().unwrap(), 1);
    }

    #[test]
    fn invalidate_all_keys_reports_how_many_were_present() {
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .loader(|k: &String| Ok(format!("{k}v")))
            .build();
        cache.get(&"a".to_string()).unwrap();
        cache.get(&"b".to_string()).unwrap();

        let removed = cache.invalidate_all_keys(vec!["a".to_string(), "c".to_string()]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn invalidate_all_empties_the_cache() {
        let cache: FaultTolerantCache<String, String, String> = CacheConfigBuilder::new()
            .loader(|k: &String| Ok(format!("{k}v")))
            .build();
        cache.get(&"a".to_string()).unwrap();
        cache.get(&"b".to_string()).unwrap();
        cache.invalidate_all();
        assert!(cache.get_if_present(&"a".to_string()).is_none());
        assert!(cache.get_if_present(&"b".to_string()).is_none());
    }
}
