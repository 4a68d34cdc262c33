//! The retry loop itself.

use crate::config::RetryConfig;
use crate::events::RetryEvent;
use resilience_core::RetryGiveup;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_histogram, histogram};

#[cfg(feature = "tracing")]
use tracing::{debug, warn};

/// A cooperative cancellation signal for [`RetryingExecutor::run_interruptible`].
///
/// Cancellation is a mutex-guarded boolean plus a condition variable, not an
/// atomic flag: the interruptible variant needs to both poll the flag and
/// sleep on it, and a condvar lets the backoff wait wake up immediately on
/// cancellation instead of polling.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    /// Creates a token that has not yet been cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    /// Marks the token cancelled and wakes any waiter parked on it.
    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        let mut cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        condvar.notify_all();
    }

    /// Returns `true` if [`Self::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for up to `timeout`, returning early if the token is
    /// cancelled in the meantime. Returns `true` if the wait was cut short
    /// by a cancellation.
    fn wait(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let cancelled = lock.lock().unwrap_or_else(|e| e.into_inner());
        if *cancelled {
            return true;
        }
        let (cancelled, timeout_result) = condvar
            .wait_timeout(cancelled, timeout)
            .unwrap_or_else(|e| e.into_inner());
        !timeout_result.timed_out() || *cancelled
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a fallible operation with exponential backoff, independent of any
/// particular request or service type.
///
/// Built via [`crate::RetryConfigBuilder`]. `run` and `run_interruptible`
/// both block the calling thread for the duration of the backoff waits;
/// neither spawns a background task.
pub struct RetryingExecutor<E> {
    config: RetryConfig<E>,
}

impl<E> RetryingExecutor<E> {
    pub(crate) fn new(config: RetryConfig<E>) -> Self {
        #[cfg(feature = "metrics")]
        {
            describe_counter!(
                "retry_calls_total",
                "Total number of retry operations (success, ignored, or exhausted)"
            );
            describe_counter!(
                "retry_attempts_total",
                "Total number of retry attempts across all calls"
            );
            describe_histogram!("retry_attempts", "Number of attempts per successful call");
        }
        Self { config }
    }

    pub(crate) fn config(&self) -> &RetryConfig<E> {
        &self.config
    }

    /// Runs `op` until it succeeds, `retry_if` rejects an error, the retry
    /// limit is reached, or `giveup_timeout` elapses.
    pub fn run<T>(&self, op: impl FnMut() -> Result<T, E>) -> Result<T, RetryGiveup<E>> {
        self.run_with_cancel(op, None)
    }

    /// As [`Self::run`], but the backoff wait is interrupted immediately if
    /// `cancel` is cancelled. A cancellation during the wait ends the loop
    /// with a [`RetryGiveup`] wrapping the error that triggered that wait.
    pub fn run_interruptible<T>(
        &self,
        cancel: &CancelToken,
        op: impl FnMut() -> Result<T, E>,
    ) -> Result<T, RetryGiveup<E>> {
        self.run_with_cancel(op, Some(cancel))
    }

    fn run_with_cancel<T>(
        &self,
        mut op: impl FnMut() -> Result<T, E>,
        cancel: Option<&CancelToken>,
    ) -> Result<T, RetryGiveup<E>> {
        let start = Instant::now();
        let mut attempt: u32 = 0;
        let mut first_error: Option<E> = None;

        loop {
            match op() {
                Ok(value) => {
                    #[cfg(feature = "metrics")]
                    {
                        counter!("retry_calls_total", "retry" => self.config.name.clone(), "result" => "success")
                            .increment(1);
                        histogram!("retry_attempts", "retry" => self.config.name.clone())
                            .record((attempt + 1) as f64);
                    }
                    #[cfg(feature = "tracing")]
                    {
                        if attempt > 0 {
                            debug!(retry = %self.config.name, attempts = attempt + 1, "retry succeeded after retries");
                        } else {
                            debug!(retry = %self.config.name, "retry succeeded on first attempt");
                        }
                    }
                    self.config.event_listeners.emit(&RetryEvent::Success {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });
                    return Ok(value);
                }
                Err(error) => {
                    let retryable = self.config.should_retry(&error);
                    if first_error.is_none() {
                        first_error = Some(error);
                    }

                    if !retryable {
                        #[cfg(feature = "metrics")]
                        counter!("retry_calls_total", "retry" => self.config.name.clone(), "result" => "ignored")
                            .increment(1);
                        #[cfg(feature = "tracing")]
                        debug!(retry = %self.config.name, "error not retryable, giving up immediately");
                        self.config.event_listeners.emit(&RetryEvent::IgnoredError {
                            pattern_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            attempt: attempt + 1,
                        });
                        return Err(RetryGiveup::new(first_error.unwrap(), attempt + 1));
                    }

                    if attempt >= self.config.retry_limit {
                        #[cfg(feature = "metrics")]
                        counter!("retry_calls_total", "retry" => self.config.name.clone(), "result" => "exhausted")
                            .increment(1);
                        #[cfg(feature = "tracing")]
                        warn!(retry = %self.config.name, attempts = attempt + 1, "retry limit exhausted");
                        self.config.event_listeners.emit(&RetryEvent::Giveup {
                            pattern_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });
                        return Err(RetryGiveup::new(first_error.unwrap(), attempt + 1));
                    }

                    let delay = self.config.backoff_for(attempt);
                    if let Some(timeout) = self.config.giveup_timeout {
                        if start.elapsed() + delay > timeout {
                            #[cfg(feature = "metrics")]
                            counter!("retry_calls_total", "retry" => self.config.name.clone(), "result" => "timeout_exhausted")
                                .increment(1);
                            #[cfg(feature = "tracing")]
                            warn!(retry = %self.config.name, attempts = attempt + 1, "giveup timeout reached");
                            self.config.event_listeners.emit(&RetryEvent::Giveup {
                                pattern_name: self.config.name.clone(),
                                timestamp: Instant::now(),
                                attempts: attempt + 1,
                            });
                            return Err(RetryGiveup::new(first_error.unwrap(), attempt + 1));
                        }
                    }

                    #[cfg(feature = "metrics")]
                    counter!("retry_attempts_total", "retry" => self.config.name.clone()).increment(1);
                    #[cfg(feature = "tracing")]
                    debug!(retry = %self.config.name, attempt = attempt + 1, delay_ms = delay.as_millis(), "retrying after delay");

                    self.config.event_listeners.emit(&RetryEvent::Retry {
                        pattern_name: self.config.name.clone(),
                        timestamp: Instant::now(),
                        attempt: attempt + 1,
                        delay,
                    });

                    let interrupted = match cancel {
                        Some(token) => token.wait(delay),
                        None => {
                            std::thread::sleep(delay);
                            false
                        }
                    };
                    if interrupted {
                        #[cfg(feature = "metrics")]
                        counter!("retry_calls_total", "retry" => self.config.name.clone(), "result" => "cancelled")
                            .increment(1);
                        #[cfg(feature = "tracing")]
                        warn!(retry = %self.config.name, attempts = attempt + 1, "backoff wait cancelled");
                        self.config.event_listeners.emit(&RetryEvent::Giveup {
                            pattern_name: self.config.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                        });
                        return Err(RetryGiveup::new(first_error.unwrap(), attempt + 1));
                    }

                    attempt += 1;
                }
            }
        }
    }
}
