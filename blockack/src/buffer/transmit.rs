//! Transmission window of the active destination.
//!
//! The window owns every PDU queued for one destination until it is
//! acknowledged or dropped. It maintains:
//! - a pending queue (not sent yet, retransmissions first)
//! - an in-flight queue (sent, unacknowledged, sorted by SN, size-capped)
//! - the flags driving the Ack-Request handshake

use alloc::collections::{BTreeSet, VecDeque};
use alloc::vec::Vec;

use crate::config::LinkConfig;
use crate::model::{AckRequest, Address, Pdu, SequenceNumber};
use crate::size::SizeMetric;

/// What the window would emit next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Nothing to send, or a reply is awaited.
    None,

    /// The head of the pending queue.
    Data,

    /// An Ack-Request closing the burst.
    AckRequest,
}

/// A unit taken out of the window for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transmission {
    /// Copy of the data PDU now in flight.
    Data(Pdu),

    /// Body of the Ack-Request closing the burst.
    AckRequest(AckRequest),
}

/// Fate of one in-flight PDU after an acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Listed in the acked set; left the window.
    Acknowledged { sn: SequenceNumber, attempts: u32 },

    /// Implicitly lost, back at the front of the pending queue.
    Requeued { sn: SequenceNumber, attempts: u32 },

    /// Implicitly lost with its lifetime over. Carries the final attempt count.
    Dropped(Pdu),
}

/// Counts produced by [`TransmissionWindow::process_acknowledgement`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckSummary {
    /// PDUs listed in the acked set.
    pub acknowledged: usize,
    /// PDUs moved back to the pending queue.
    pub requeued: usize,
    /// PDUs discarded for good.
    pub dropped: usize,
}

impl AckSummary {
    /// Every in-flight PDU the acknowledgement resolved.
    pub const fn total(&self) -> usize {
        self.acknowledged + self.requeued + self.dropped
    }
}

/// Outgoing queues towards one destination.
///
/// PDUs wait in the pending queue until the in-flight limit lets them out;
/// in-flight PDUs stay until an acknowledgement resolves them.
#[derive(Debug)]
pub struct TransmissionWindow {
    destination: Address,

    pending: VecDeque<Pdu>,

    /// Always sorted ascending by SN.
    in_flight: VecDeque<Pdu>,

    ack_request_pending: bool,

    waiting_for_ack: bool,

    next_sn: SequenceNumber,

    max_in_flight: usize,

    metric: SizeMetric,

    impatient: bool,

    request_on_drain: bool,
}

impl TransmissionWindow {
    /// Creates the window of `destination`, numbering from `next_sn`.
    pub fn new(destination: Address, next_sn: SequenceNumber, config: &LinkConfig) -> Self {
        Self {
            destination,
            pending: VecDeque::new(),
            in_flight: VecDeque::new(),
            ack_request_pending: false,
            waiting_for_ack: false,
            next_sn,
            max_in_flight: config.max_in_flight,
            metric: config.size_metric,
            impatient: config.impatient_ack_request,
            request_on_drain: config.ack_request_on_drain,
        }
    }

    /// Peer this window sends to.
    pub fn destination(&self) -> Address {
        self.destination
    }

    /// Sequence number the next enqueued PDU will get.
    pub fn next_sequence(&self) -> SequenceNumber {
        self.next_sn
    }

    /// An Ack-Request went out and its reply is outstanding.
    pub fn waiting_for_ack(&self) -> bool {
        self.waiting_for_ack
    }

    /// The next unit to send is an Ack-Request.
    pub fn ack_request_pending(&self) -> bool {
        self.ack_request_pending
    }

    /// PDUs not yet transmitted in the current burst.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// PDUs transmitted and not yet resolved.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Pending queue size under the configured metric.
    pub fn pending_size(&self) -> usize {
        self.metric.total(&self.pending)
    }

    /// In-flight size under the configured metric.
    pub fn in_flight_size(&self) -> usize {
        self.metric.total(&self.in_flight)
    }

    /// Size of everything the window holds.
    pub fn buffered_size(&self) -> usize {
        self.pending_size() + self.in_flight_size()
    }

    /// True once every queued PDU is accounted for.
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }

    /// SNs of the pending queue, front first.
    pub fn pending_sequences(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        self.pending.iter().filter_map(Pdu::sn)
    }

    /// SNs in flight, ascending.
    pub fn in_flight_sequences(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        self.in_flight.iter().filter_map(Pdu::sn)
    }

    /// Numbers `pdu` and appends it to the pending queue.
    pub fn enqueue(&mut self, mut pdu: Pdu) -> SequenceNumber {
        let sn = self.next_sn;
        pdu.assign_sequence(sn);
        self.next_sn = sn.next();
        self.pending.push_back(pdu);

        log::trace!("{}: queued {}", self.destination, sn);
        sn
    }

    /// What `consume` would hand out next, without taking it.
    pub fn select_next(&self) -> Selection {
        if self.waiting_for_ack {
            return Selection::None;
        }

        let in_flight = self.in_flight_size();
        let head_fits = self
            .pending
            .front()
            .map(|head| in_flight + self.metric.size(head) <= self.max_in_flight);

        if head_fits == Some(true) {
            return Selection::Data;
        }

        if !self.ack_request_pending {
            return Selection::None;
        }

        let would_overflow = head_fits == Some(false);
        let full_and_dry = self.pending.is_empty() && in_flight == self.max_in_flight;
        let drained = self.request_on_drain && self.pending.is_empty();

        if self.impatient || would_overflow || full_and_dry || drained {
            Selection::AckRequest
        } else {
            Selection::None
        }
    }

    /// Takes the unit chosen by [`select_next`](Self::select_next).
    pub fn consume(&mut self) -> Option<Transmission> {
        match self.select_next() {
            Selection::None => None,
            Selection::Data => {
                let pdu = self.pending.pop_front()?;
                let transmitted = pdu.clone();
                self.insert_in_flight(pdu);
                self.ack_request_pending = true;

                debug_assert!(self.in_flight_size() <= self.max_in_flight);
                log::trace!(
                    "{}: {} in flight (attempt {})",
                    self.destination,
                    transmitted.sn().unwrap_or_default(),
                    transmitted.attempt()
                );
                Some(Transmission::Data(transmitted))
            }
            Selection::AckRequest => {
                let floor = self.in_flight.front()?.sn().unwrap_or_default();
                self.waiting_for_ack = true;
                self.ack_request_pending = false;

                log::debug!(
                    "{}: ack-request floor {} over {} in flight",
                    self.destination,
                    floor,
                    self.in_flight.len()
                );
                Some(Transmission::AckRequest(AckRequest { floor }))
            }
        }
    }

    fn insert_in_flight(&mut self, pdu: Pdu) {
        let sn = pdu.sn();
        let index = self.in_flight.partition_point(|queued| queued.sn() < sn);
        self.in_flight.insert(index, pdu);
    }

    /// Resolves every in-flight PDU against the acknowledged set.
    ///
    /// `expired` decides whether a lost PDU is dropped; it sees the PDU with
    /// its attempt counter already advanced. `report` is called once per
    /// in-flight PDU, in SN order. An empty set treats the whole burst as
    /// lost.
    pub fn process_acknowledgement<E, R>(
        &mut self,
        acked: &BTreeSet<SequenceNumber>,
        mut expired: E,
        mut report: R,
    ) -> AckSummary
    where
        E: FnMut(&Pdu) -> bool,
        R: FnMut(Resolution),
    {
        self.waiting_for_ack = false;
        self.ack_request_pending = false;

        let mut summary = AckSummary::default();
        let mut requeue = Vec::new();
        let mut cursor = acked.iter().peekable();

        for mut pdu in self.in_flight.drain(..) {
            let sn = pdu.sn().unwrap_or_default();

            // SNs acknowledged but no longer in flight
            while cursor.next_if(|acked_sn| **acked_sn < sn).is_some() {}

            if cursor.next_if_eq(&&sn).is_some() {
                summary.acknowledged += 1;
                report(Resolution::Acknowledged {
                    sn,
                    attempts: pdu.attempt(),
                });
                continue;
            }

            let attempts = pdu.count_attempt();
            if expired(&pdu) {
                log::warn!(
                    "{}: dropping {} after {} attempts",
                    self.destination,
                    sn,
                    attempts - 1
                );
                summary.dropped += 1;
                report(Resolution::Dropped(pdu));
            } else {
                summary.requeued += 1;
                report(Resolution::Requeued { sn, attempts });
                requeue.push(pdu);
            }
        }

        for pdu in requeue.into_iter().rev() {
            self.pending.push_front(pdu);
        }

        log::debug!(
            "{}: ack resolved {} acked, {} requeued, {} dropped",
            self.destination,
            summary.acknowledged,
            summary.requeued,
            summary.dropped
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    const LOCAL: Address = Address(1);
    const PEER: Address = Address(2);

    fn window(max_in_flight: usize) -> TransmissionWindow {
        let config = LinkConfig::new()
            .with_max_in_flight(max_in_flight)
            .with_ack_request_on_drain(false);
        TransmissionWindow::new(PEER, SequenceNumber::ZERO, &config)
    }

    fn data() -> Pdu {
        Pdu::data(LOCAL, PEER, vec![0xAA; 8])
    }

    fn acked(sns: &[u64]) -> BTreeSet<SequenceNumber> {
        sns.iter().copied().map(SequenceNumber).collect()
    }

    fn sent_sn(transmission: Option<Transmission>) -> u64 {
        match transmission {
            Some(Transmission::Data(pdu)) => pdu.sn().unwrap().get(),
            other => panic!("expected data, got {:?}", other),
        }
    }

    fn never_expired(_: &Pdu) -> bool {
        false
    }

    #[test]
    fn test_enqueue_numbers_sequentially() {
        let mut window = window(3);
        assert_eq!(window.enqueue(data()), SequenceNumber(0));
        assert_eq!(window.enqueue(data()), SequenceNumber(1));
        assert_eq!(window.next_sequence(), SequenceNumber(2));
        assert_eq!(window.pending_len(), 2);
    }

    #[test]
    fn test_burst_then_request_then_full_ack() {
        let mut window = window(3);
        for _ in 0..3 {
            window.enqueue(data());
        }

        assert_eq!(sent_sn(window.consume()), 0);
        assert_eq!(sent_sn(window.consume()), 1);
        assert_eq!(sent_sn(window.consume()), 2);

        assert_eq!(window.select_next(), Selection::AckRequest);
        assert_eq!(
            window.consume(),
            Some(Transmission::AckRequest(AckRequest {
                floor: SequenceNumber(0)
            }))
        );
        assert!(window.waiting_for_ack());
        assert_eq!(window.select_next(), Selection::None);
        assert_eq!(window.consume(), None);

        let mut outcomes = Vec::new();
        let summary =
            window.process_acknowledgement(&acked(&[0, 1, 2]), never_expired, |r| outcomes.push(r));

        assert_eq!(summary.acknowledged, 3);
        assert_eq!(window.in_flight_len(), 0);
        assert!(window.is_drained());
        assert!(!window.waiting_for_ack());
        assert!(outcomes.iter().all(|r| matches!(
            r,
            Resolution::Acknowledged { attempts: 1, .. }
        )));
    }

    #[test]
    fn test_lost_pdu_is_retransmitted_before_new_data() {
        let mut window = window(3);
        for _ in 0..3 {
            window.enqueue(data());
        }
        for _ in 0..4 {
            window.consume();
        }

        let summary = window.process_acknowledgement(&acked(&[0, 2]), never_expired, |_| {});
        assert_eq!(summary.acknowledged, 2);
        assert_eq!(summary.requeued, 1);

        window.enqueue(data());
        let pending: Vec<u64> = window.pending_sequences().map(|sn| sn.get()).collect();
        assert_eq!(pending, vec![1, 3]);

        match window.consume() {
            Some(Transmission::Data(pdu)) => {
                assert_eq!(pdu.sn(), Some(SequenceNumber(1)));
                assert_eq!(pdu.attempt(), 2);
            }
            other => panic!("expected retransmission, got {:?}", other),
        }
        assert_eq!(sent_sn(window.consume()), 3);
    }

    #[test]
    fn test_expired_pdu_is_dropped() {
        let mut window = window(2);
        window.enqueue(data());
        window.enqueue(data());
        for _ in 0..3 {
            window.consume();
        }

        let mut dropped = Vec::new();
        let summary = window.process_acknowledgement(
            &acked(&[1]),
            |pdu| pdu.sn() == Some(SequenceNumber(0)),
            |r| {
                if let Resolution::Dropped(pdu) = r {
                    dropped.push(pdu);
                }
            },
        );

        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.requeued, 0);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].attempt(), 2);
        assert!(window.is_drained());
    }

    #[test]
    fn test_silence_requeues_whole_burst() {
        let config = LinkConfig::new().with_max_in_flight(4);
        let mut window = TransmissionWindow::new(PEER, SequenceNumber(7), &config);
        window.enqueue(data());
        window.enqueue(data());
        window.consume();
        window.consume();
        assert!(matches!(window.consume(), Some(Transmission::AckRequest(_))));

        let summary = window.process_acknowledgement(&BTreeSet::new(), never_expired, |_| {});

        assert_eq!(summary.requeued, 2);
        assert!(!window.waiting_for_ack());
        let pending: Vec<u64> = window.pending_sequences().map(|sn| sn.get()).collect();
        assert_eq!(pending, vec![7, 8]);
    }

    #[test]
    fn test_in_flight_never_exceeds_limit() {
        let config = LinkConfig::new()
            .with_max_in_flight(20)
            .with_size_metric(SizeMetric::Bytes);
        let mut window = TransmissionWindow::new(PEER, SequenceNumber::ZERO, &config);
        for len in [8, 8, 8, 3] {
            window.enqueue(Pdu::data(LOCAL, PEER, vec![0; len]));
        }

        assert_eq!(sent_sn(window.consume()), 0);
        assert_eq!(sent_sn(window.consume()), 1);
        assert!(window.in_flight_size() <= 20);

        // third PDU would overflow: the burst is closed instead
        assert_eq!(window.select_next(), Selection::AckRequest);
        assert!(matches!(window.consume(), Some(Transmission::AckRequest(_))));
        assert_eq!(window.in_flight_size(), 16);
    }

    #[test]
    fn test_patient_window_waits_for_more_data() {
        let mut window = window(3);
        window.enqueue(data());
        window.consume();

        assert!(window.ack_request_pending());
        assert_eq!(window.select_next(), Selection::None);

        let config = LinkConfig::new()
            .with_max_in_flight(3)
            .with_ack_request_on_drain(false)
            .with_impatient_ack_request(true);
        let mut impatient = TransmissionWindow::new(PEER, SequenceNumber::ZERO, &config);
        impatient.enqueue(data());
        impatient.consume();
        assert_eq!(impatient.select_next(), Selection::AckRequest);
    }

    #[test]
    fn test_drained_window_requests_ack() {
        let config = LinkConfig::new().with_max_in_flight(3);
        let mut window = TransmissionWindow::new(PEER, SequenceNumber::ZERO, &config);
        window.enqueue(data());
        window.consume();

        assert_eq!(window.select_next(), Selection::AckRequest);
    }

    #[test]
    fn test_every_in_flight_pdu_is_accounted_for() {
        let mut window = window(5);
        for _ in 0..5 {
            window.enqueue(data());
        }
        for _ in 0..6 {
            window.consume();
        }
        let in_flight = window.in_flight_len();

        // stale SN 99 and missing 1, 3
        let summary = window.process_acknowledgement(
            &acked(&[0, 2, 4, 99]),
            |pdu| pdu.sn() == Some(SequenceNumber(3)),
            |_| {},
        );

        assert_eq!(summary.total(), in_flight);
        assert_eq!(summary.acknowledged, 3);
        assert_eq!(summary.requeued, 1);
        assert_eq!(summary.dropped, 1);
        assert_eq!(window.in_flight_len(), 0);
    }
}
