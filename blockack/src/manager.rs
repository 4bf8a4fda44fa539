//! Frame management collaborator.
//!
//! The controller asks its [`Manager`] whether a lost PDU may still be
//! retried and to build the control frames it transmits. Frame type and
//! addresses are read straight from the [`Pdu`] record.

use crate::model::{Address, Pdu, PduKind};
use crate::time::{Duration, Instant};

/// Lifetime policy and control frame factory of a controller.
pub trait Manager {
    /// Whether `pdu` must be dropped instead of retransmitted.
    ///
    /// Called after the attempt counter was advanced for the next try.
    fn lifetime_expired(&self, pdu: &Pdu, now: Instant) -> bool;

    /// Builds an Ack-Request or Ack-Reply frame.
    fn create_control_frame(
        &self,
        source: Address,
        destination: Address,
        kind: PduKind,
        nav: Duration,
    ) -> Pdu {
        Pdu::control(source, destination, kind, nav)
    }
}

/// Lifetime policy: deadline carried by the PDU plus an optional retry limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultManager {
    max_retransmissions: Option<u32>,
}

impl DefaultManager {
    /// Creates a manager allowing `max_retransmissions` retries, unlimited on `None`.
    pub const fn new(max_retransmissions: Option<u32>) -> Self {
        Self {
            max_retransmissions,
        }
    }

    /// Configured retry limit.
    pub const fn max_retransmissions(&self) -> Option<u32> {
        self.max_retransmissions
    }
}

impl Manager for DefaultManager {
    fn lifetime_expired(&self, pdu: &Pdu, now: Instant) -> bool {
        if pdu.deadline_passed(now) {
            return true;
        }
        // attempt 1 is the original transmission
        self.max_retransmissions
            .is_some_and(|limit| pdu.attempt() > limit.saturating_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SequenceNumber;
    use alloc::vec;

    fn queued() -> Pdu {
        let mut pdu = Pdu::data(Address(1), Address(2), vec![0; 4]);
        pdu.assign_sequence(SequenceNumber(0));
        pdu
    }

    #[test]
    fn test_retry_limit() {
        let manager = DefaultManager::new(Some(1));
        let mut pdu = queued();
        let now = Instant::EPOCH;

        // second attempt is the single allowed retransmission
        pdu.count_attempt();
        assert!(!manager.lifetime_expired(&pdu, now));

        pdu.count_attempt();
        assert!(manager.lifetime_expired(&pdu, now));
    }

    #[test]
    fn test_deadline_without_limit() {
        let manager = DefaultManager::new(None);
        let mut pdu = queued().with_deadline(Instant::from_micros(100));

        for _ in 0..50 {
            pdu.count_attempt();
        }
        assert!(!manager.lifetime_expired(&pdu, Instant::from_micros(99)));
        assert!(manager.lifetime_expired(&pdu, Instant::from_micros(100)));
    }
}
