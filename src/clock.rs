//! Time Source Module
//!
//! Abstracts "now" so expiration can be tested without sleeping.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

// == Clock Trait ==
/// Supplies the current time to the cache.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

// == Real Clock ==
/// Clock backed by the monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl RealClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// == Fake Clock ==
/// Manually advanced clock for tests.
///
/// Starts at the instant it was created and only moves when
/// [`FakeClock::advance`] is called.
#[derive(Debug)]
pub struct FakeClock {
    now: Mutex<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Moves the clock forward by `by`.
    ///
    /// Saturates at the latest instant the platform can represent.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add(by) {
            *now = next;
            return;
        }

        // Creep up to the limit with halving steps.
        let mut step = by;
        while !step.is_zero() {
            match now.checked_add(step) {
                Some(next) if next > *now => *now = next,
                Some(_) => break,
                None => step /= 2,
            }
        }
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}
