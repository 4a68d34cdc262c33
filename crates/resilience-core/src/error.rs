//! Shared error kinds.
//!
//! Every primitive in this toolkit wraps the caller's own application error
//! type `E` rather than inventing its own error hierarchy for loader/reloader
//! failures — the same "composable error" shape the rest of the resilience
//! toolkit uses elsewhere, just with the pattern-specific variants this
//! error model calls for (`LoaderFailure`, `ReloaderFailure`,
//! `FailureRateLimitExceeded`, `RetryGiveup`).

use std::fmt;
use std::sync::Arc;

/// Errors surfaced by `FaultTolerantCache` on the mandatory path.
///
/// `E` is the error type returned by the caller's loader/reloader closures.
/// Failures observed by followers of a single-flight reload share the same
/// `Arc<E>` as the owner, since `E` is not required to implement `Clone`.
#[derive(Debug)]
pub enum CacheError<E> {
    /// The configured loader returned an error and no usable cached value
    /// existed to fall back on.
    LoaderFailure(Arc<E>),

    /// The configured bulk reloader returned an error, or completed without
    /// producing a value for a key the caller is waiting on. `None` covers
    /// the latter case: the reloader returned `Ok(())` but simply never
    /// called the sink for this key.
    ReloaderFailure(Option<Arc<E>>),

    /// The failure-rate-limit bucket was drained; the loader was not
    /// invoked at all for this call.
    FailureRateLimitExceeded,
}

impl<E> fmt::Display for CacheError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::LoaderFailure(e) => write!(f, "loader failed: {e}"),
            CacheError::ReloaderFailure(Some(e)) => write!(f, "bulk reloader failed: {e}"),
            CacheError::ReloaderFailure(None) => {
                write!(f, "bulk reloader completed without producing this key")
            }
            CacheError::FailureRateLimitExceeded => {
                write!(f, "failure rate limit exceeded; loader was not invoked")
            }
        }
    }
}

impl<E> std::error::Error for CacheError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::LoaderFailure(e) => Some(e.as_ref()),
            CacheError::ReloaderFailure(e) => e.as_deref(),
            CacheError::FailureRateLimitExceeded => None,
        }
    }
}

impl<E> CacheError<E> {
    /// True if this is a [`CacheError::LoaderFailure`].
    pub fn is_loader_failure(&self) -> bool {
        matches!(self, CacheError::LoaderFailure(_))
    }

    /// True if this is a [`CacheError::ReloaderFailure`].
    pub fn is_reloader_failure(&self) -> bool {
        matches!(self, CacheError::ReloaderFailure(_))
    }

    /// True if the failure rate limit caused this call to short-circuit.
    pub fn is_failure_rate_limited(&self) -> bool {
        matches!(self, CacheError::FailureRateLimitExceeded)
    }

    /// Borrows the wrapped application error, if any.
    pub fn application_error(&self) -> Option<&E> {
        match self {
            CacheError::LoaderFailure(e) => Some(e),
            CacheError::ReloaderFailure(e) => e.as_deref(),
            CacheError::FailureRateLimitExceeded => None,
        }
    }
}

impl<E> Clone for CacheError<E> {
    fn clone(&self) -> Self {
        match self {
            CacheError::LoaderFailure(e) => CacheError::LoaderFailure(Arc::clone(e)),
            CacheError::ReloaderFailure(e) => CacheError::ReloaderFailure(e.clone()),
            CacheError::FailureRateLimitExceeded => CacheError::FailureRateLimitExceeded,
        }
    }
}

/// Raised by `RetryingExecutor` when the retry budget is exhausted and no
/// `on_giveup` callback was configured to handle it instead.
///
/// Carries the *first* error observed, per the giveup contract: the first
/// failure is usually the most informative one, since later failures may
/// just be the same root cause repeating.
#[derive(Debug)]
pub struct RetryGiveup<E> {
    /// The error from the first failed attempt.
    pub cause: E,
    /// Total number of attempts made, including the first.
    pub attempts: u32,
}

impl<E> RetryGiveup<E> {
    pub fn new(cause: E, attempts: u32) -> Self {
        Self { cause, attempts }
    }
}

impl<E> fmt::Display for RetryGiveup<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gave up after {} attempt(s): {}", self.attempts, self.cause)
    }
}

impl<E> std::error::Error for RetryGiveup<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug, Clone)]
    struct Boom(&'static str);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn cache_error_display_and_predicates() {
        let err: CacheError<Boom> = CacheError::LoaderFailure(Arc::new(Boom("upstream down")));
        assert!(err.is_loader_failure());
        assert!(!err.is_reloader_failure());
        assert_eq!(err.to_string(), "loader failed: upstream down");
        assert!(err.application_error().is_some());

        let limited: CacheError<Boom> = CacheError::FailureRateLimitExceeded;
        assert!(limited.is_failure_rate_limited());
        assert!(limited.application_error().is_none());
    }

    #[test]
    fn reloader_failure_without_cause_has_a_readable_display() {
        let omitted: CacheError<Boom> = CacheError::ReloaderFailure(None);
        assert!(omitted.is_reloader_failure());
        assert!(omitted.application_error().is_none());
        assert_eq!(
            omitted.to_string(),
            "bulk reloader completed without producing this key"
        );
    }

    #[test]
    fn retry_giveup_carries_first_cause() {
        let giveup = RetryGiveup::new(Boom("timeout"), 4);
        assert_eq!(giveup.attempts, 4);
        assert_eq!(giveup.to_string(), "gave up after 4 attempt(s): timeout");
    }
}
