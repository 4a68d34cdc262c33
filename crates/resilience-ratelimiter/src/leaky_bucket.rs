//! A fractional-token leaky bucket.
//!
//! Unlike the fixed-window/sliding-window counters common in HTTP rate
//! limiters, a leaky bucket tracks a continuously draining `f64` of
//! "available capacity": every operation first lets capacity leak back in
//! proportional to elapsed wall-clock time, then applies the requested
//! change. Fractional tokens let a caller charge partial credit per event
//! (see [`LeakyBucket`] docs) rather than being limited to whole permits.

use parking_lot::Mutex;
use std::time::Instant;

#[cfg(feature = "tracing")]
use tracing::trace;

struct State {
    available: f64,
    last_flow_in: Instant,
    leak_rate: f64,
}

/// Configuration for a [`LeakyBucket`].
#[derive(Debug, Clone, Copy)]
pub struct LeakyBucketConfig {
    /// Maximum capacity the bucket can hold.
    pub capacity: f64,
    /// Units replenished per second.
    pub leak_rate: f64,
    /// The most negative `available_capacity` can go (0.0 disallows
    /// overdraft entirely). Must be `<= 0.0`.
    pub allowed_negative_capacity: f64,
}

impl LeakyBucketConfig {
    /// A bucket with no overdraft allowed.
    pub fn new(capacity: f64, leak_rate: f64) -> Self {
        Self {
            capacity,
            leak_rate,
            allowed_negative_capacity: 0.0,
        }
    }

    /// Allows `available_capacity` to go as low as `-amount` before
    /// `try_flow_in` starts refusing.
    pub fn with_allowed_negative_capacity(mut self, amount: f64) -> Self {
        self.allowed_negative_capacity = -amount.abs();
        self
    }
}

/// A thread-safe fractional-token meter for rate limiting and admission
/// control.
///
/// The leak equation adds `leak_rate * elapsed_seconds` to the available
/// capacity on every state-changing operation, then clamps the result to
/// `[allowed_negative_capacity, capacity]`. Every public method is
/// serialized by a single internal mutex — this primitive is intentionally
/// not lock-free: the leak calculation and the admission decision must be
/// observed as one atomic step, and the mutex is held only for that brief
/// arithmetic, never across I/O.
///
/// The cache in this toolkit reuses `LeakyBucket` as a failure-rate gate:
/// each loader failure costs one unit, and a burst of `capacity` failures
/// is tolerated before the mandatory path starts short-circuiting with
/// `FailureRateLimitExceeded` instead of calling the loader again.
pub struct LeakyBucket {
    state: Mutex<State>,
    capacity: f64,
    allowed_negative_capacity: f64,
}

impl LeakyBucket {
    /// Creates a new, full bucket.
    pub fn new(config: LeakyBucketConfig) -> Self {
        assert!(config.capacity >= 0.0, "capacity must be non-negative");
        assert!(
            config.allowed_negative_capacity <= 0.0,
            "allowed_negative_capacity must be <= 0.0"
        );
        Self {
            state: Mutex::new(State {
                available: config.capacity,
                last_flow_in: Instant::now(),
                leak_rate: config.leak_rate,
            }),
            capacity: config.capacity,
            allowed_negative_capacity: config.allowed_negative_capacity,
        }
    }

    /// A convenience constructor matching the common `(burst, per_second)`
    /// shape used for a failure-rate gate: a burst of `burst` events is
    /// tolerated, refilling at `per_second` units/sec, no overdraft.
    pub fn with_burst_and_rate(burst: f64, per_second: f64) -> Self {
        Self::new(LeakyBucketConfig::new(burst, per_second))
    }

    /// Advances `last_flow_in` to now and returns the clamped, time-adjusted
    /// available capacity. Must be called with the lock held.
    fn leak_locked(&self, state: &mut State) -> f64 {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_flow_in).as_secs_f64();
        state.last_flow_in = now;
        let leaked = state.available + state.leak_rate * elapsed;
        state.available = leaked.clamp(self.allowed_negative_capacity, self.capacity);
        state.available
    }

    /// Returns the clamped, time-adjusted current capacity. Has the
    /// side-effect of advancing the internal clock reference (this
    /// matches the source behavior: reading capacity also settles the
    /// leak calculation so back-to-back reads are consistent).
    pub fn available_capacity(&self) -> f64 {
        let mut state = self.state.lock();
        self.leak_locked(&mut state)
    }

    /// Attempts to admit `amount`. If the current available capacity
    /// (after leaking) is at least `amount`, subtracts it and returns
    /// `true`. Otherwise returns `false`, leaving the state only
    /// leak-advanced (no debit on rejection).
    pub fn try_flow_in(&self, amount: f64) -> bool {
        let mut state = self.state.lock();
        let available = self.leak_locked(&mut state);
        if available >= amount {
            state.available = (available - amount).clamp(self.allowed_negative_capacity, self.capacity);
            #[cfg(feature = "tracing")]
            trace!(amount, remaining = state.available, "leaky bucket admitted");
            true
        } else {
            #[cfg(feature = "tracing")]
            trace!(amount, available, "leaky bucket rejected");
            false
        }
    }

    /// Unconditionally subtracts `amount`, clamped to the configured
    /// bounds. Use this for debits that must happen regardless of whether
    /// capacity was available (e.g. counting a failure that already
    /// occurred).
    pub fn flow_in(&self, amount: f64) {
        let mut state = self.state.lock();
        let available = self.leak_locked(&mut state);
        state.available = (available - amount).clamp(self.allowed_negative_capacity, self.capacity);
    }

    /// Updates the leak rate. Does not rebase the internal clock reference
    /// or otherwise touch `available_capacity`.
    pub fn set_leak_rate(&self, leak_rate: f64) {
        let mut state = self.state.lock();
        state.leak_rate = leak_rate;
    }

    /// Resets available capacity to the configured maximum and rebases the
    /// clock reference to now.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.available = self.capacity;
        state.last_flow_in = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn clear_resets_to_capacity() {
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(5.0, 1.0));
        bucket.flow_in(3.0);
        assert!(bucket.available_capacity() < 5.0);
        bucket.clear();
        assert_eq!(bucket.available_capacity(), 5.0);
    }

    #[test]
    fn try_flow_in_admits_iff_enough_capacity() {
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(2.0, 0.0));
        assert!(bucket.try_flow_in(1.0));
        assert!(bucket.try_flow_in(1.0));
        // capacity exhausted, no leak rate configured to replenish it
        assert!(!bucket.try_flow_in(0.5));
    }

    #[test]
    fn try_flow_in_does_not_debit_on_rejection() {
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(1.0, 0.0));
        assert!(!bucket.try_flow_in(2.0));
        assert_eq!(bucket.available_capacity(), 1.0);
    }

    #[test]
    fn leak_replenishes_over_time() {
        // capacity=3, leak_rate=0.5/sec — mirrors the documented S7 scenario.
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(3.0, 0.5));
        assert!(bucket.try_flow_in(1.0));
        let after_first = bucket.available_capacity();
        assert!((after_first - 2.0).abs() < 0.05);

        sleep(Duration::from_millis(1000));
        assert!(bucket.try_flow_in(1.0));
        let after_second = bucket.available_capacity();
        assert!(
            (after_second - 1.5).abs() < 0.15,
            "expected ~1.5, got {after_second}"
        );
    }

    #[test]
    fn clamps_to_capacity_even_with_long_leak() {
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(2.0, 100.0));
        bucket.flow_in(1.0);
        sleep(Duration::from_millis(200));
        assert_eq!(bucket.available_capacity(), 2.0);
    }

    #[test]
    fn allowed_negative_capacity_permits_overdraft() {
        let bucket = LeakyBucket::new(
            LeakyBucketConfig::new(1.0, 0.0).with_allowed_negative_capacity(2.0),
        );
        bucket.flow_in(1.0);
        bucket.flow_in(2.0);
        assert_eq!(bucket.available_capacity(), -2.0);
        bucket.flow_in(10.0);
        assert_eq!(bucket.available_capacity(), -2.0);
    }

    #[test]
    fn set_leak_rate_does_not_rebase_available() {
        let bucket = LeakyBucket::new(LeakyBucketConfig::new(5.0, 0.0));
        bucket.flow_in(2.0);
        let before = bucket.available_capacity();
        bucket.set_leak_rate(10.0);
        assert_eq!(bucket.available_capacity(), before);
    }
}
