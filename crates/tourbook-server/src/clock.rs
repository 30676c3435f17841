//! Time source injected into the cache and the reconciliation job.
//!
//! Production code uses [`SystemClock`]; tests drive expiry and lifecycle
//! transitions deterministically through [`ManualClock`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use time::OffsetDateTime;

/// A source of "now".
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> OffsetDateTime;
}

/// Shareable clock handle.
pub type DynClock = Arc<dyn Clock>;

/// Wall clock in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(datetime!(2026-07-01 12:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-07-01 12:00 UTC));

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), datetime!(2026-07-01 12:01:30 UTC));

        clock.set(datetime!(2026-01-01 00:00 UTC));
        assert_eq!(clock.now(), datetime!(2026-01-01 00:00 UTC));
    }
}
