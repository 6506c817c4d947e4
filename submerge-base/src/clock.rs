// Per the "global mutable state" design note: a process-wide clock is
// replaced with an explicit, injectable `Clock` so the commit pipeline and
// transaction manager can be driven deterministically in tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond-resolution source of wall-clock-derived time. The commit
/// pipeline never reads `SystemTime` directly; it always goes through a
/// `Clock` so commit-time monotonicity can be tested without sleeping.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the Unix epoch. Need not be
    /// monotonic by itself -- callers combine it with the last commit time
    /// to get a monotonic sequence (spec §4.D, "Commit time").
    fn now_micros(&self) -> i64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        dur.as_micros() as i64
    }
}

/// A clock tests can advance explicitly. Starts at an arbitrary but fixed
/// instant so tests don't depend on the real wall clock at all.
pub struct FakeClock {
    micros: AtomicI64,
}

impl FakeClock {
    pub fn new(start_micros: i64) -> Self {
        FakeClock {
            micros: AtomicI64::new(start_micros),
        }
    }

    pub fn advance(&self, delta_micros: i64) -> i64 {
        self.micros.fetch_add(delta_micros, Ordering::SeqCst) + delta_micros
    }

    pub fn set(&self, micros: i64) {
        self.micros.store(micros, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        FakeClock::new(1_600_000_000_000_000)
    }
}

impl Clock for FakeClock {
    fn now_micros(&self) -> i64 {
        self.micros.load(Ordering::SeqCst)
    }
}
