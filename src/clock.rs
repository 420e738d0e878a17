//! Injectable clock capability.
//!
//! Measures elapsed time with `std::time::Instant`, the same pattern
//! `circuit_breaker.rs` uses, while also needing a wall-clock timestamp for
//! the report DTO, the same role `health/checks.rs`'s `Utc::now().to_rfc3339()`
//! plays there. Real code uses [`SystemClock`]; tests use [`TestClock`] so
//! interval/staleness assertions don't depend on real time.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Pure, thread-safe time source (§5 — "Clock: pure, thread-safe;
/// injectable for tests").
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn instant(&self) -> Instant;
}

/// Default clock backed by the real system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// Manually-advanced clock for deterministic tests. `instant()` is derived
/// from a fixed base plus the elapsed wall-clock offset so running-time
/// measurements taken inside a single `execute()` call still behave
/// sensibly even though `now()` only moves when `advance` is called.
#[derive(Clone)]
pub struct TestClock {
    inner: Arc<Mutex<TestClockState>>,
}

struct TestClockState {
    now: DateTime<Utc>,
    base_instant: Instant,
    offset: Duration,
}

impl TestClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestClockState {
                now: start,
                base_instant: Instant::now(),
                offset: Duration::ZERO,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.inner.lock().unwrap();
        state.now += chrono::Duration::from_std(by).unwrap_or_default();
        state.offset += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    fn instant(&self) -> Instant {
        let state = self.inner.lock().unwrap();
        state.base_instant + state.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_both_now_and_instant() {
        let start = Utc::now();
        let clock = TestClock::new(start);
        let i0 = clock.instant();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(5));
        assert!(clock.instant() >= i0 + Duration::from_secs(5));
    }
}
