//! Clock abstraction for deterministic time-based testing.
//!
//! All scheduling decisions in the outbox (due-item selection, retry
//! backoff, lock expiry) go through [`Clock`] so tests can drive time
//! explicitly instead of sleeping.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};

/// Provides current time and sleep operations.
///
/// Production code uses [`RealClock`]; tests use [`TestClock`] to control
/// time deterministically.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by the system time and the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// 2024-01-01T00:00:00Z, the default origin for test time.
const DEFAULT_START_MICROS: i64 = 1_704_067_200_000_000;

/// Deterministic clock for tests.
///
/// Time only moves when [`advance`](TestClock::advance) or
/// [`jump_to`](TestClock::jump_to) is called. `sleep` advances the clock by
/// the requested duration and yields once, so code awaiting a sleep makes
/// progress without real delays.
#[derive(Debug, Clone)]
pub struct TestClock {
    micros: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a clock starting at a fixed origin (2024-01-01T00:00:00Z).
    pub fn new() -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(DEFAULT_START_MICROS)),
        }
    }

    /// Creates a clock starting at the given instant.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            micros: Arc::new(AtomicI64::new(start.timestamp_micros())),
        }
    }

    /// Moves time forward by the given duration.
    pub fn advance(&self, duration: Duration) {
        let delta = i64::try_from(duration.as_micros()).unwrap_or(i64::MAX);
        self.micros.fetch_add(delta, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute instant.
    pub fn jump_to(&self, instant: DateTime<Utc>) {
        self.micros.store(instant.timestamp_micros(), Ordering::SeqCst);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}
