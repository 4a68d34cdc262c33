use resilience_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a [`crate::RetryingExecutor`].
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry attempt is about to be made, after the given delay.
    Retry {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
    },
    /// The operation succeeded (either on the first try or after retries).
    Success {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// The operation failed and will not be retried because `retry_if`
    /// rejected the error.
    IgnoredError {
        pattern_name: String,
        timestamp: Instant,
        attempt: u32,
    },
    /// The retry budget (count or wall-clock) was exhausted; the executor
    /// is giving up.
    Giveup {
        pattern_name: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "Retry",
            RetryEvent::Success { .. } => "Success",
            RetryEvent::IgnoredError { .. } => "IgnoredError",
            RetryEvent::Giveup { .. } => "Giveup",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. }
            | RetryEvent::Giveup { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RetryEvent::Retry { pattern_name, .. }
            | RetryEvent::Success { pattern_name, .. }
            | RetryEvent::IgnoredError { pattern_name, .. }
            | RetryEvent::Giveup { pattern_name, .. } => pattern_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types() {
        let now = Instant::now();
        let retry = RetryEvent::Retry {
            pattern_name: "test".to_string(),
            timestamp: now,
            attempt: 1,
            delay: Duration::from_secs(1),
        };
        assert_eq!(retry.event_type(), "Retry");

        let success = RetryEvent::Success {
            pattern_name: "test".to_string(),
            timestamp: now,
            attempts: 2,
        };
        assert_eq!(success.event_type(), "Success");

        let giveup = RetryEvent::Giveup {
            pattern_name: "test".to_string(),
            timestamp: now,
            attempts: 4,
        };
        assert_eq!(giveup.event_type(), "Giveup");
        assert_eq!(giveup.pattern_name(), "test");
    }
}
