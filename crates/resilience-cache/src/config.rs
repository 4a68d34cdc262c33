//! Configuration for [`crate::FaultTolerantCache`].

use crate::events::CacheEvent;
use crate::queue::RefreshQueue;
use crate::refresher::{BulkReloader, Loader, SingleFlightRefresher};
use crate::segment::{CacheSegment, FreshnessHorizons};
use resilience_core::{CacheError, EventListeners, FnListener};
use resilience_executor::{BlockingExecutor, Executor};
use resilience_ratelimiter::LeakyBucket;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`crate::FaultTolerantCache`].
///
/// `loader` is the only required field; everything else defaults to
/// `<unnamed>` name, no size cap, and four shards.
pub struct CacheConfigBuilder<K, V, E>
where
    E: Send + Sync,
{
    maximum_size: usize,
    concurrency_level: usize,
    expire_after_write: Option<Duration>,
    refresh_after_write: Option<Duration>,
    asynchronous_refresh_after_write: Option<Duration>,
    executor: Option<Arc<dyn Executor>>,
    loader: Option<Loader<K, V, E>>,
    reloader: Option<BulkReloader<K, V, E>>,
    bulk_reload_size_limit: usize,
    failure_rate_limit: Option<(f64, f64)>,
    event_listeners: EventListeners<CacheEvent<E>>,
    name: String,
}

impl<K, V, E> CacheConfigBuilder<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            maximum_size: 0,
            concurrency_level: 4,
            expire_after_write: None,
            refresh_after_write: None,
            asynchronous_refresh_after_write: None,
            executor: None,
            loader: None,
            reloader: None,
            bulk_reload_size_limit: 100,
            failure_rate_limit: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Global cap across all shards, divided evenly (rounded up). `0`
    /// (the default) means unlimited.
    pub fn maximum_size(mut self, size: usize) -> Self {
        self.maximum_size = size;
        self
    }

    /// Number of independently-locked shards. Clamped to at least 1.
    ///
    /// Default: 4
    pub fn concurrency_level(mut self, level: usize) -> Self {
        self.concurrency_level = level.max(1);
        self
    }

    /// Hard horizon: entries older than this are never served, even stale.
    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.expire_after_write = Some(duration);
        self
    }

    /// Foreground-refresh horizon: `get` falls back to the stale value
    /// only if a synchronous reload attempt fails.
    pub fn refresh_after_write(mut self, duration: Duration) -> Self {
        self.refresh_after_write = Some(duration);
        self
    }

    /// Background-refresh horizon, usually shorter than
    /// `refresh_after_write`: `get` serves the stale value immediately
    /// and enqueues a background reload.
    pub fn asynchronous_refresh_after_write(mut self, duration: Duration) -> Self {
        self.asynchronous_refresh_after_write = Some(duration);
        self
    }

    /// Where background refreshes run. Defaults to a shared
    /// [`BlockingExecutor`] sized to the available parallelism.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// The single-key loader. Required.
    pub fn loader<F>(mut self, f: F) -> Self
    where
        F: Fn(&K) -> Result<V, E> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
        self
    }

    /// An optional bulk reloader, used in place of the single-key loader
    /// for background refresh when configured.
    pub fn reloader<F>(mut self, f: F) -> Self
    where
        F: Fn(&[K], &mut dyn FnMut(K, V)) -> Result<(), E> + Send + Sync + 'static,
    {
        self.reloader = Some(Arc::new(f));
        self
    }

    /// Maximum number of keys passed to the bulk reloader per call.
    ///
    /// Default: 100
    pub fn bulk_reload_size_limit(mut self, limit: usize) -> Self {
        self.bulk_reload_size_limit = limit;
        self
    }

    /// Enables the failure-rate gate: a [`LeakyBucket`] with the given
    /// burst capacity and per-second leak rate. Once drained, `get` fails
    /// fast with [`CacheError::FailureRateLimitExceeded`] instead of
    /// invoking the loader.
    pub fn failure_rate_limit(mut self, burst: f64, per_second: f64) -> Self {
        self.failure_rate_limit = Some((burst, per_second));
        self
    }

    /// Registers a listener notified on every loader/reloader failure and
    /// on `FailureRateLimitExceeded`, whether or not the failure was
    /// propagated to a caller.
    pub fn exception_listener<F>(mut self, f: F) -> Self
    where
        F: Fn(&CacheError<E>) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &CacheEvent<E>| {
            if let CacheEvent::Exception { error, .. } = event {
                f(error);
            }
        }));
        self
    }

    /// Identifies this cache instance in tracing spans/metrics labels.
    ///
    /// Default: `"<unnamed>"`
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the cache.
    ///
    /// # Panics
    ///
    /// Panics if `loader` was not set.
    pub fn build(self) -> crate::FaultTolerantCache<K, V, E> {
        let loader = self.loader.expect("loader must be set before building");

        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(BlockingExecutor::default_sized()));

        let failure_bucket = self
            .failure_rate_limit
            .map(|(burst, per_second)| Arc::new(LeakyBucket::with_burst_and_rate(burst, per_second)));

        let refresher = Arc::new(SingleFlightRefresher::new(
            self.name.clone(),
            loader,
            self.reloader,
            failure_bucket,
            self.event_listeners.clone(),
        ));

        let queue = Arc::new(RefreshQueue::new(
            Arc::clone(&refresher),
            executor,
            self.bulk_reload_size_limit,
        ));

        let horizons = FreshnessHorizons {
            expire_after_write: self.expire_after_write,
            refresh_after_write: self.refresh_after_write,
            asynchronous_refresh_after_write: self.asynchronous_refresh_after_write,
        };

        let shard_count = self.concurrency_level;
        let maximum_size_per_segment = if self.maximum_size == 0 {
            0
        } else {
            self.maximum_size.div_ceil(shard_count)
        };

        let segments = (0..shard_count)
            .map(|_| {
                Arc::new(CacheSegment::new(
                    maximum_size_per_segment,
                    horizons,
                    self.name.clone(),
                    refresher.event_listeners().clone(),
                ))
            })
            .collect();

        crate::FaultTolerantCache::from_parts(segments, refresher, queue, self.name)
    }
}

impl<K, V, E> Default for CacheConfigBuilder<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
