//! Per-PDU outcome reporting.

use crate::model::Address;

/// Receives one notification per resolved in-flight PDU.
///
/// A failure is either an implicit loss that will be retried (`dropped`
/// false) or the final one after which the PDU is discarded.
pub trait LossTracker {
    /// A PDU was acknowledged after `attempts` transmissions.
    fn on_success(&mut self, destination: Address, attempts: u32);

    /// A PDU was implicitly lost on attempt `attempts`.
    fn on_failure(&mut self, destination: Address, attempts: u32, dropped: bool);
}

/// No-op tracker.
impl LossTracker for () {
    fn on_success(&mut self, _destination: Address, _attempts: u32) {}

    fn on_failure(&mut self, _destination: Address, _attempts: u32, _dropped: bool) {}
}

/// Aggregate outcome counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LossCounters {
    /// PDUs acknowledged.
    pub successes: u64,

    /// Implicit losses that led to a retransmission.
    pub retries: u64,

    /// PDUs discarded after their last failed attempt.
    pub drops: u64,

    /// Transmission attempts spent on acknowledged PDUs.
    pub attempts_on_success: u64,
}

impl LossCounters {
    /// All counters at zero.
    pub const fn new() -> Self {
        Self {
            successes: 0,
            retries: 0,
            drops: 0,
            attempts_on_success: 0,
        }
    }

    /// Every failure notification, retried or final.
    pub const fn failures(&self) -> u64 {
        self.retries + self.drops
    }

    /// Share of resolved PDUs that were acknowledged, in percent.
    pub fn success_rate(&self) -> f32 {
        let total = self.successes + self.drops;
        if total == 0 {
            100.0
        } else {
            (self.successes as f32 / total as f32) * 100.0
        }
    }

    /// Average attempts an acknowledged PDU needed.
    pub fn mean_attempts(&self) -> f32 {
        if self.successes == 0 {
            0.0
        } else {
            self.attempts_on_success as f32 / self.successes as f32
        }
    }

    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl LossTracker for LossCounters {
    fn on_success(&mut self, _destination: Address, attempts: u32) {
        self.successes += 1;
        self.attempts_on_success += u64::from(attempts);
    }

    fn on_failure(&mut self, _destination: Address, _attempts: u32, dropped: bool) {
        if dropped {
            self.drops += 1;
        } else {
            self.retries += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut counters = LossCounters::new();
        assert_eq!(counters.success_rate(), 100.0);

        counters.on_success(Address(1), 1);
        counters.on_success(Address(1), 3);
        counters.on_failure(Address(1), 2, false);
        counters.on_failure(Address(2), 8, true);

        assert_eq!(counters.successes, 2);
        assert_eq!(counters.retries, 1);
        assert_eq!(counters.drops, 1);
        assert_eq!(counters.failures(), 2);
        assert_eq!(counters.mean_attempts(), 2.0);
        let rate = counters.success_rate();
        assert!(rate > 66.6 && rate < 66.7);

        counters.reset();
        assert_eq!(counters, LossCounters::default());
    }
}
