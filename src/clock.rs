//! Logical timestamps for ordering writes.
//!
//! A timestamp is `millis * 1_000_000 + counter`: the wall-clock millisecond
//! scaled up, plus a per-millisecond counter so two writes issued within the
//! same millisecond still compare strictly ordered.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of logical ticks per wall-clock millisecond.
pub const TICKS_PER_MILLI: i64 = 1_000_000;

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn wall_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Strictly increasing timestamp source.
///
/// Safe to share between threads: every call to [`Clock::now`] returns a
/// value greater than any value previously returned by the same clock.
#[derive(Debug, Default)]
pub struct Clock {
    last: AtomicI64,
}

impl Clock {
    /// Creates a new clock.
    pub fn new() -> Self {
        Self { last: AtomicI64::new(0) }
    }

    /// Creates a clock whose timestamps are all greater than `timestamp`.
    ///
    /// Used on open so new writes order after every version already on disk,
    /// even when the wall clock has not yet passed them.
    pub fn starting_after(timestamp: i64) -> Self {
        Self { last: AtomicI64::new(timestamp.max(0)) }
    }

    /// Returns the next timestamp.
    pub fn now(&self) -> i64 {
        let base = wall_millis().saturating_mul(TICKS_PER_MILLI);
        let mut last = self.last.load(Ordering::Acquire);
        loop {
            // A new millisecond resets the counter; otherwise bump it.
            let next = if base > last { base } else { last + 1 };
            match self.last.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Converts a logical timestamp back to wall-clock milliseconds.
pub fn to_millis(timestamp: i64) -> i64 {
    timestamp / TICKS_PER_MILLI
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_clock_strictly_increasing() {
        let clock = Clock::new();
        let mut prev = clock.now();
        for _ in 0..10_000 {
            let next = clock.now();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_clock_starting_after_future_timestamp() {
        // An hour ahead of the wall clock
        let ahead = (wall_millis() + 3_600_000) * TICKS_PER_MILLI + 42;
        let clock = Clock::starting_after(ahead);

        let first = clock.now();
        assert_eq!(first, ahead + 1);
        assert!(clock.now() > first);
    }

    #[test]
    fn test_clock_starting_after_past_timestamp() {
        let clock = Clock::starting_after(5);
        let before = wall_millis();
        assert!(to_millis(clock.now()) >= before);
    }

    #[test]
    fn test_clock_tracks_wall_time() {
        let clock = Clock::new();
        let before = wall_millis();
        let ts = clock.now();
        let after = wall_millis();

        assert!(to_millis(ts) >= before);
        assert!(to_millis(ts) <= after);
    }

    #[test]
    fn test_clock_concurrent_unique() {
        use std::thread;

        let clock = Arc::new(Clock::new());
        let mut handles = vec![];

        for _ in 0..8 {
            let clock = clock.clone();
            handles.push(thread::spawn(move || (0..1000).map(|_| clock.now()).collect::<Vec<_>>()));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            let stamps = handle.join().unwrap();
            // Each thread observes its own calls in increasing order
            assert!(stamps.windows(2).all(|w| w[0] < w[1]));
            for ts in stamps {
                assert!(seen.insert(ts), "duplicate timestamp {}", ts);
            }
        }
        assert_eq!(seen.len(), 8000);
    }
}
