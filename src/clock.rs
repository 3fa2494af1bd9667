//! Clock abstractions.
//!
//! Storage consults a [`Clock`] to decide whether entries have expired.
//! Three implementations cover the practical cases:
//!
//! - [`SystemClock`]: the real monotonic clock (the default).
//! - [`RandomizedClock`]: probabilistically skews the reported time
//!   forward. Deployed across a fleet, this staggers expirations so that
//!   instances do not all refresh the same hot key at the same instant.
//! - [`ManualClock`]: a fixed, manually advanceable clock for tests.
//!
//! A shared `Arc<C>` clock handle is itself a [`Clock`], so one clock
//! instance can drive several components.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Provides the current time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// The system monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that skews the reported time forward with a configurable
/// probability.
///
/// With probability `probability`, [`now`](Clock::now) returns
/// `inner.now() + skew`; otherwise it returns `inner.now()` unchanged.
/// Reading a skewed "now" makes entries appear to expire `skew` early,
/// which spreads refresh load across a fleet instead of synchronizing it.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use readthrough::clock::{Clock, RandomizedClock, SystemClock};
///
/// // Expire up to one minute early on roughly a quarter of reads.
/// let clock = RandomizedClock::new(SystemClock, Duration::from_secs(60), 0.25);
/// let _ = clock.now();
/// ```
#[derive(Debug, Clone)]
pub struct RandomizedClock<C = SystemClock> {
    clock: C,
    skew: Duration,
    probability: f64,
}

impl<C: Clock> RandomizedClock<C> {
    /// Creates a randomized clock over `clock`.
    ///
    /// `probability` is clamped into `[0, 1]`.
    pub fn new(clock: C, skew: Duration, probability: f64) -> Self {
        Self {
            clock,
            skew,
            probability: probability.clamp(0.0, 1.0),
        }
    }
}

impl<C: Clock> Clock for RandomizedClock<C> {
    fn now(&self) -> Instant {
        let now = self.clock.now();
        if rand::random::<f64>() < self.probability {
            now + self.skew
        } else {
            now
        }
    }
}

/// A clock under manual control.
///
/// Reports a fixed instant until advanced. Intended for tests that need
/// deterministic expiration behavior.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use readthrough::clock::{Clock, ManualClock};
///
/// let clock = ManualClock::new(Instant::now());
/// let start = clock.now();
/// clock.advance(Duration::from_secs(30));
/// assert_eq!(clock.now(), start + Duration::from_secs(30));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, instant: Instant) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
