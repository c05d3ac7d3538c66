//! Retry backoff.
//!
//! The execution engine waits between attempts using a [`BackoffPolicy`].
//! The default [`ExponentialBackoff`] draws a random integer multiplier:
//!
//! ```text
//! delay(n) = base × random(1 ..= 2^n)        (optionally capped at max)
//!
//! Attempt  Range (base = 250ms, uncapped)
//! -------  ------------------------------
//! 1        250ms – 500ms
//! 2        250ms – 1s
//! 3        250ms – 2s
//! 4        250ms – 4s
//! ```
//!
//! Jitter spreads retries from many clients hitting the same busy replica.
//! The wait itself is an async sleep that holds no lock.

use rand::Rng;
use std::time::Duration;

/// Largest exponent used for the jitter range; keeps the multiplier in `u32`.
const MAX_EXPONENT: u32 = 20;

/// Computes how long to wait before the next attempt.
pub trait BackoffPolicy: Send + Sync + 'static {
    /// Delay to await after attempt `attempt` (1-based) failed.
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with full multiplicative jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Minimum delay; every delay is an integer multiple of it.
    pub base: Duration,

    /// Ceiling applied after jitter. `None` leaves delays unbounded.
    pub max: Option<Duration>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Some(Duration::from_secs(8)),
        }
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Option<Duration>) -> Self {
        Self { base, max }
    }

    /// Fast delays for tests.
    pub fn testing() -> Self {
        Self {
            base: Duration::from_millis(1),
            max: Some(Duration::from_millis(10)),
        }
    }

    /// Largest jitter multiplier for `attempt`.
    pub fn max_multiplier(attempt: u32) -> u32 {
        1u32 << attempt.min(MAX_EXPONENT)
    }

    /// Inclusive range every `delay(attempt)` falls in.
    pub fn bounds(&self, attempt: u32) -> (Duration, Duration) {
        let low = self.cap(self.base);
        let high = self.cap(self.base.saturating_mul(Self::max_multiplier(attempt)));
        (low, high)
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let multiplier = rand::thread_rng().gen_range(1..=Self::max_multiplier(attempt));
        self.cap(self.base.saturating_mul(multiplier))
    }
}
