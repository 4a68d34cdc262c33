//! Events emitted by [`crate::FaultTolerantCache`].

use resilience_core::{CacheError, ResilienceEvent};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Observability events for a [`crate::FaultTolerantCache`] instance.
pub enum CacheEvent<E> {
    /// A lookup found a servable value without needing a synchronous reload.
    Hit { pattern_name: String, timestamp: Instant },
    /// A lookup found no usable value and performed a mandatory load.
    Miss { pattern_name: String, timestamp: Instant },
    /// An entry was evicted to make room under `maximum_size_per_segment`.
    Eviction { pattern_name: String, timestamp: Instant },
    /// A loader/reloader failure, or a failure-rate-limit short-circuit,
    /// that was not propagated to a caller (sync-refresh fallback,
    /// background refresh, or bulk reload).
    Exception {
        pattern_name: String,
        timestamp: Instant,
        error: Arc<CacheError<E>>,
    },
}

impl<E> Clone for CacheEvent<E> {
    fn clone(&self) -> Self {
        match self {
            CacheEvent::Hit { pattern_name, timestamp } => CacheEvent::Hit {
                pattern_name: pattern_name.clone(),
                timestamp: *timestamp,
            },
            CacheEvent::Miss { pattern_name, timestamp } => CacheEvent::Miss {
                pattern_name: pattern_name.clone(),
                timestamp: *timestamp,
            },
            CacheEvent::Eviction { pattern_name, timestamp } => CacheEvent::Eviction {
                pattern_name: pattern_name.clone(),
                timestamp: *timestamp,
            },
            CacheEvent::Exception { pattern_name, timestamp, error } => CacheEvent::Exception {
                pattern_name: pattern_name.clone(),
                timestamp: *timestamp,
                error: Arc::clone(error),
            },
        }
    }
}

impl<E> fmt::Debug for CacheEvent<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheEvent::Hit { pattern_name, .. } => {
                f.debug_struct("Hit").field("pattern_name", pattern_name).finish()
            }
            CacheEvent::Miss { pattern_name, .. } => {
                f.debug_struct("Miss").field("pattern_name", pattern_name).finish()
            }
            CacheEvent::Eviction { pattern_name, .. } => f
                .debug_struct("Eviction")
                .field("pattern_name", pattern_name)
                .finish(),
            CacheEvent::Exception { pattern_name, .. } => f
                .debug_struct("Exception")
                .field("pattern_name", pattern_name)
                .finish(),
        }
    }
}

impl<E: Send + Sync> ResilienceEvent for CacheEvent<E> {
    fn event_type(&self) -> &'static str {
        match self {
            CacheEvent::Hit { .. } => "Hit",
            CacheEvent::Miss { .. } => "Miss",
            CacheEvent::Eviction { .. } => "Eviction",
            CacheEvent::Exception { .. } => "Exception",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            CacheEvent::Hit { timestamp, .. }
            | CacheEvent::Miss { timestamp, .. }
            | CacheEvent::Eviction { timestamp, .. }
            | CacheEvent::Exception { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            CacheEvent::Hit { pattern_name, .. }
            | CacheEvent::Miss { pattern_name, .. }
            | CacheEvent::Eviction { pattern_name, .. }
            | CacheEvent::Exception { pattern_name, .. } => pattern_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types() {
        let now = Instant::now();
        let hit: CacheEvent<String> = CacheEvent::Hit {
            pattern_name: "c".into(),
            timestamp: now,
        };
        assert_eq!(hit.event_type(), "Hit");

        let exception: CacheEvent<String> = CacheEvent::Exception {
            pattern_name: "c".into(),
            timestamp: now,
            error: Arc::new(CacheError::FailureRateLimitExceeded),
        };
        assert_eq!(exception.event_type(), "Exception");
        assert_eq!(exception.pattern_name(), "c");
    }
}
