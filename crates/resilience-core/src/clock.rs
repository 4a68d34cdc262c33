//! A monotonic millisecond clock.
//!
//! Freshness calculations in the cache and the leak equation in the rate
//! limiter both need "now" as a number that only ever increases and never
//! depends on wall-clock adjustments (NTP steps, DST, manual clock changes).
//! [`MonotonicClock`] derives milliseconds from [`std::time::Instant`],
//! which is backed by the OS monotonic clock, expressed as a safe,
//! non-overflowing `u64` of milliseconds since first use in this process.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// A cheap, `Copy`, process-wide monotonic clock reporting milliseconds
/// since the first call to any `MonotonicClock` method in this process.
///
/// A `u64` of milliseconds since process start cannot overflow within any
/// realistic process lifetime (over 500 million years at that resolution),
/// satisfying the "must not overflow" requirement for the freshness clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl MonotonicClock {
    /// Creates a new clock handle. Cheap enough to construct per call site.
    pub fn new() -> Self {
        Self
    }

    /// Milliseconds elapsed since the clock's epoch (first use in this
    /// process). Monotonic: never decreases between calls.
    pub fn now_millis(&self) -> u64 {
        epoch().elapsed().as_millis() as u64
    }

    /// The underlying `Instant`, for callers that need sub-millisecond
    /// precision (the leak-rate calculation in `LeakyBucket`).
    pub fn now_instant(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn now_millis_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now_millis();
        sleep(Duration::from_millis(5));
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn now_millis_advances_roughly_with_sleep() {
        let clock = MonotonicClock::new();
        let a = clock.now_millis();
        sleep(Duration::from_millis(50));
        let b = clock.now_millis();
        assert!(b - a >= 40, "expected ~50ms elapsed, got {}ms", b - a);
    }
}
