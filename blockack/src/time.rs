//! Clock-agnostic time points.
//!
//! The engine never reads a clock. Every event handed to it carries the
//! current [`Instant`], measured from an arbitrary epoch chosen by the driver
//! (a simulator's start time, a monotonic boot clock, ...).

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

pub use core::time::Duration;

/// A point in time, as an offset from the driver's epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(Duration);

impl Instant {
    /// The driver's epoch.
    pub const EPOCH: Self = Self(Duration::ZERO);

    /// Creates an instant at the given offset from the epoch.
    pub const fn from_epoch(offset: Duration) -> Self {
        Self(offset)
    }

    /// Creates an instant `micros` after the epoch.
    pub const fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }

    /// Offset from the epoch.
    pub const fn since_epoch(&self) -> Duration {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant(self.0 + rhs)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        self.saturating_duration_since(rhs)
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0.as_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_arithmetic() {
        let start = Instant::from_micros(100);
        let later = start + Duration::from_micros(16);

        assert!(later > start);
        assert_eq!(later - start, Duration::from_micros(16));
        assert_eq!(start - later, Duration::ZERO);
    }
}
