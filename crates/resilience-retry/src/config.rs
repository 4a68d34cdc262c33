//! Configuration for [`crate::RetryingExecutor`].

use crate::events::RetryEvent;
use resilience_core::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// A predicate deciding whether a given error should be retried.
pub type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Configuration for a [`crate::RetryingExecutor`].
pub struct RetryConfig<E> {
    pub(crate) retry_limit: u32,
    pub(crate) initial_retry_wait: Duration,
    pub(crate) max_retry_wait: Duration,
    pub(crate) wait_grow_rate: f64,
    pub(crate) giveup_timeout: Option<Duration>,
    pub(crate) retry_if: Option<RetryPredicate<E>>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl<E> RetryConfig<E> {
    /// Backoff wait before the retry that follows the given 0-indexed
    /// attempt (the attempt that just failed).
    pub(crate) fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.wait_grow_rate.powi(attempt as i32);
        let millis = (self.initial_retry_wait.as_millis() as f64) * factor;
        let millis = millis.min(self.max_retry_wait.as_millis() as f64).max(0.0);
        Duration::from_millis(millis as u64)
    }

    pub(crate) fn should_retry(&self, error: &E) -> bool {
        match &self.retry_if {
            Some(predicate) => predicate(error),
            None => true,
        }
    }
}

/// Builder for [`RetryConfig`] / [`crate::RetryingExecutor`].
pub struct RetryConfigBuilder<E> {
    retry_limit: u32,
    initial_retry_wait: Duration,
    max_retry_wait: Duration,
    wait_grow_rate: f64,
    giveup_timeout: Option<Duration>,
    retry_if: Option<RetryPredicate<E>>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl<E> RetryConfigBuilder<E>
where
    E: Send + Sync + 'static,
{
    /// A builder seeded with sensible defaults: 5 retries, 500ms initial
    /// wait, 300s max wait, wait doubling on each attempt, no wall-clock
    /// giveup budget.
    pub fn new() -> Self {
        Self {
            retry_limit: 5,
            initial_retry_wait: Duration::from_millis(500),
            max_retry_wait: Duration::from_secs(300),
            wait_grow_rate: 2.0,
            giveup_timeout: None,
            retry_if: None,
            event_listeners: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Maximum number of retries after the first attempt. The operation is
    /// invoked at most `retry_limit + 1` times in total.
    ///
    /// Default: 5
    pub fn retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Wait before the first retry.
    ///
    /// Default: 500ms
    pub fn initial_retry_wait(mut self, wait: Duration) -> Self {
        self.initial_retry_wait = wait;
        self
    }

    /// Upper bound on any single backoff wait.
    ///
    /// Default: 300s
    pub fn max_retry_wait(mut self, wait: Duration) -> Self {
        self.max_retry_wait = wait;
        self
    }

    /// Multiplier applied to the wait on each successive retry.
    ///
    /// Default: 2.0
    pub fn wait_grow_rate(mut self, rate: f64) -> Self {
        self.wait_grow_rate = rate;
        self
    }

    /// A wall-clock budget for the whole retry loop. Once the next backoff
    /// wait would push the elapsed time past this budget, the executor
    /// gives up instead of sleeping through it.
    ///
    /// Default: disabled (bounded only by `retry_limit`)
    pub fn giveup_timeout(mut self, timeout: Duration) -> Self {
        self.giveup_timeout = Some(timeout);
        self
    }

    /// Only errors for which this predicate returns `true` are retried.
    /// Others fail immediately with a [`RetryEvent::IgnoredError`].
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    /// Name used to label events emitted by the resulting executor.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback invoked just before each retry wait.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if matches!(event, RetryEvent::Retry { .. }) {
                f(event);
            }
        }));
        self
    }

    /// Registers a callback invoked when the executor gives up and returns
    /// a [`resilience_core::RetryGiveup`] to the caller.
    pub fn on_giveup<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if matches!(event, RetryEvent::Giveup { .. }) {
                f(event);
            }
        }));
        self
    }

    /// Registers a listener for every [`RetryEvent`] emitted by the
    /// resulting executor.
    pub fn on_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(f));
        self
    }

    pub fn build(self) -> crate::RetryingExecutor<E> {
        let config = RetryConfig {
            retry_limit: self.retry_limit,
            initial_retry_wait: self.initial_retry_wait,
            max_retry_wait: self.max_retry_wait,
            wait_grow_rate: self.wait_grow_rate,
            giveup_timeout: self.giveup_timeout,
            retry_if: self.retry_if,
            event_listeners: self.event_listeners,
            name: self.name,
        };
        crate::RetryingExecutor::new(config)
    }
}

impl<E> Default for RetryConfigBuilder<E>
where
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let executor = RetryConfigBuilder::<String>::new()
            .initial_retry_wait(Duration::from_millis(10))
            .max_retry_wait(Duration::from_millis(35))
            .wait_grow_rate(2.0)
            .build();
        assert_eq!(executor.config().backoff_for(0), Duration::from_millis(10));
        assert_eq!(executor.config().backoff_for(1), Duration::from_millis(20));
        // 10 * 2^2 = 40, capped to 35
        assert_eq!(executor.config().backoff_for(2), Duration::from_millis(35));
    }

    #[test]
    fn builder_defaults_match_spec() {
        let executor = RetryConfigBuilder::<String>::new().build();
        let config = executor.config();
        assert_eq!(config.retry_limit, 5);
        assert_eq!(config.initial_retry_wait, Duration::from_millis(500));
        assert_eq!(config.max_retry_wait, Duration::from_secs(300));
        assert_eq!(config.wait_grow_rate, 2.0);
        assert!(config.giveup_timeout.is_none());
    }

    #[test]
    fn retry_if_filters_errors() {
        let executor = RetryConfigBuilder::<String>::new()
            .retry_if(|e: &String| e == "retryable")
            .build();
        assert!(executor.config().should_retry(&"retryable".to_string()));
        assert!(!executor.config().should_retry(&"fatal".to_string()));
    }

    #[test]
    fn on_retry_and_on_giveup_only_fire_for_their_variant() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let retries = Arc::new(AtomicUsize::new(0));
        let giveups = Arc::new(AtomicUsize::new(0));
        let retries2 = retries.clone();
        let giveups2 = giveups.clone();

        let executor = RetryConfigBuilder::<String>::new()
            .on_retry(move |_| {
                retries2.fetch_add(1, Ordering::SeqCst);
            })
            .on_giveup(move |_| {
                giveups2.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        executor.config().event_listeners.emit(&RetryEvent::Retry {
            pattern_name: "t".into(),
            timestamp: std::time::Instant::now(),
            attempt: 1,
            delay: Duration::from_millis(1),
        });
        executor.config().event_listeners.emit(&RetryEvent::Giveup {
            pattern_name: "t".into(),
            timestamp: std::time::Instant::now(),
            attempts: 6,
        });

        assert_eq!(retries.load(Ordering::SeqCst), 1);
        assert_eq!(giveups.load(Ordering::SeqCst), 1);
    }
}
