//! Link controller.
//!
//! The controller is the sans-IO state machine of one station. It owns the
//! active transmission window (one destination at a time, plus one parked
//! PDU for the next destination), a reception window per known source and
//! the single ack timer.
//!
//! The driver feeds it:
//! - PHY notifications (`on_tx_start`, `on_tx_end`, `on_rx_start`, `on_rx_end`, `on_rx_error`)
//! - decoded frames (`handle_incoming`)
//! - the clock (`handle_timeout` once `poll_timeout` is reached)
//!
//! and drains `poll_transmit` and `poll_event` after each call.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::buffer::{Arrival, ReceptionWindow, Resolution, Transmission, TransmissionWindow};
use crate::config::{LinkConfig, RxErrorPolicy};
use crate::error::{Error, Rejected, Result};
use crate::manager::{DefaultManager, Manager};
use crate::model::{Address, FrameKind, Pdu, PduKind, SequenceNumber, SequenceRegistry};
use crate::reliable::{AckTimer, LossTracker};
use crate::time::{Duration, Instant};

/// Acknowledgement handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckState {
    /// No reply expected.
    #[default]
    Idle,

    /// Ack-Request sent, nothing heard yet.
    WaitingForAck,

    /// A frame is arriving while a reply is expected.
    ReceivingReply,
}

/// Outcome reported to the upper layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Data PDU received in order.
    Delivered(Pdu),

    /// Own data PDU confirmed by its destination.
    Acknowledged {
        destination: Address,
        sn: SequenceNumber,
        attempts: u32,
    },

    /// Own data PDU abandoned after its lifetime ran out.
    Dropped(Pdu),
}

/// Statistics about controller operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Data frames handed to the PHY, retransmissions included.
    pub data_sent: u64,

    /// Data frames sent again after a loss.
    pub retransmissions: u64,

    /// Ack-Requests handed to the PHY.
    pub ack_requests_sent: u64,

    /// Ack-Replies handed to the PHY.
    pub ack_replies_sent: u64,

    /// Data PDUs delivered to the upper layer.
    pub delivered: u64,

    /// Data PDUs received more than once.
    pub duplicates: u64,

    /// Bursts resolved without a reply.
    pub timeouts: u64,

    /// Corrupt receptions reported by the PHY.
    pub rx_errors: u64,

    /// Frames addressed to another station.
    pub overheard: u64,
}

impl LinkStats {
    /// Share of data transmissions that were retransmissions, in percent.
    pub fn retransmission_rate(&self) -> f32 {
        if self.data_sent == 0 {
            0.0
        } else {
            (self.retransmissions as f32 / self.data_sent as f32) * 100.0
        }
    }
}

/// Block-ACK link controller of one station.
#[derive(Debug)]
pub struct LinkController<M = DefaultManager, L = ()> {
    address: Address,

    config: LinkConfig,

    manager: M,

    tracker: L,

    state: AckState,

    active: Option<TransmissionWindow>,

    /// Head PDU of the look-ahead destination.
    parked: Option<Pdu>,

    receivers: BTreeMap<Address, ReceptionWindow>,

    sequences: SequenceRegistry,

    /// Sources owed a reply, with the instant it may be sent.
    replies: VecDeque<(Address, Instant)>,

    timer: AckTimer,

    transmitting: bool,

    receiving: bool,

    events: VecDeque<LinkEvent>,

    stats: LinkStats,
}

impl LinkController {
    /// Creates a controller with the default manager and no loss tracking.
    pub fn new(address: Address, config: LinkConfig) -> Result<Self> {
        let manager = DefaultManager::new(config.max_retransmissions);
        Self::with_parts(address, config, manager, ())
    }
}

impl<M: Manager, L: LossTracker> LinkController<M, L> {
    /// Creates a controller with its own manager and loss tracker.
    pub fn with_parts(address: Address, config: LinkConfig, manager: M, tracker: L) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            address,
            config,
            manager,
            tracker,
            state: AckState::Idle,
            active: None,
            parked: None,
            receivers: BTreeMap::new(),
            sequences: SequenceRegistry::new(),
            replies: VecDeque::new(),
            timer: AckTimer::new(),
            transmitting: false,
            receiving: false,
            events: VecDeque::new(),
            stats: LinkStats::default(),
        })
    }

    /// Own address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Configuration in use.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Acknowledgement handshake state.
    pub fn state(&self) -> AckState {
        self.state
    }

    /// Counters since creation.
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Loss tracker fed on every resolution.
    pub fn tracker(&self) -> &L {
        &self.tracker
    }

    /// Mutable access to the loss tracker.
    pub fn tracker_mut(&mut self) -> &mut L {
        &mut self.tracker
    }

    /// Destination of the active transmission window.
    pub fn active_destination(&self) -> Option<Address> {
        self.active.as_ref().map(TransmissionWindow::destination)
    }

    /// Destination waiting in the look-ahead slot.
    pub fn next_destination(&self) -> Option<Address> {
        self.parked.as_ref().map(Pdu::destination)
    }

    /// The active transmission window.
    pub fn transmission_window(&self) -> Option<&TransmissionWindow> {
        self.active.as_ref()
    }

    /// Reception window of `source`, once it sent anything.
    pub fn reception_window(&self, source: Address) -> Option<&ReceptionWindow> {
        self.receivers.get(&source)
    }

    /// Size counted against the admission capacity.
    pub fn buffered_size(&self) -> usize {
        let outgoing = self
            .active
            .as_ref()
            .map_or(0, TransmissionWindow::buffered_size);
        let incoming: usize = self
            .receivers
            .values()
            .map(ReceptionWindow::buffered_size)
            .sum();
        outgoing + incoming
    }

    /// Configured bit width of a control frame, for airtime accounting.
    pub fn control_frame_bits(&self, kind: FrameKind) -> Option<u32> {
        self.config.control_frame_sizes.bits(kind)
    }

    /// True while an Ack-Reply is still to be sent.
    pub fn owes_reply(&self) -> bool {
        !self.replies.is_empty()
    }

    /// True when nothing is queued, parked, owed or awaited.
    pub fn is_quiescent(&self) -> bool {
        self.state == AckState::Idle
            && self.active.is_none()
            && self.parked.is_none()
            && self.replies.is_empty()
    }

    /// Whether `enqueue` would admit `pdu` now.
    pub fn can_accept(&self, pdu: &Pdu) -> bool {
        self.admission(pdu).is_ok()
    }

    fn admission(&self, pdu: &Pdu) -> Result<()> {
        if !pdu.is_data() {
            return Err(Error::NotData);
        }

        let size = self.config.size_metric.size(pdu);
        if size > self.config.max_in_flight {
            return Err(Error::Oversized {
                size,
                max_in_flight: self.config.max_in_flight,
            });
        }

        let buffered = self.buffered_size();
        if buffered >= self.config.capacity {
            return Err(Error::BufferFull {
                buffered,
                capacity: self.config.capacity,
            });
        }

        match (&self.active, &self.parked) {
            (Some(window), Some(parked)) if window.destination() != pdu.destination() => {
                Err(Error::LookAheadBusy {
                    parked: parked.destination(),
                    destination: pdu.destination(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Queues a data PDU, or hands it back when it cannot be admitted.
    pub fn enqueue(&mut self, pdu: Pdu) -> core::result::Result<(), Rejected> {
        if let Err(error) = self.admission(&pdu) {
            log::trace!("{}: rejected pdu for {}: {}", self.address, pdu.destination(), error);
            return Err(Rejected { error, pdu });
        }

        let destination = pdu.destination();
        match self.active.as_mut() {
            None => self.activate(pdu),
            Some(window) if window.destination() == destination => {
                window.enqueue(pdu);
            }
            Some(_) => {
                log::debug!("{}: parked {} as next destination", self.address, destination);
                self.parked = Some(pdu);
            }
        }
        Ok(())
    }

    fn activate(&mut self, pdu: Pdu) {
        let destination = pdu.destination();
        let next_sn = self.sequences.next_for(destination);
        let mut window = TransmissionWindow::new(destination, next_sn, &self.config);
        window.enqueue(pdu);

        log::debug!("{}: {} active from {}", self.address, destination, next_sn);
        self.active = Some(window);
    }

    /// Next frame to hand to the PHY.
    ///
    /// An owed reply holds back everything else until it is sent. Own data
    /// and Ack-Requests are only released while no reply is expected.
    pub fn poll_transmit(&mut self, now: Instant) -> Option<Pdu> {
        if self.transmitting || self.receiving {
            return None;
        }

        if let Some(pdu) = self.poll_reply(now) {
            return Some(pdu);
        }

        if !self.replies.is_empty() || self.state != AckState::Idle {
            return None;
        }

        let window = self.active.as_mut()?;
        let destination = window.destination();
        match window.consume()? {
            Transmission::Data(pdu) => {
                self.stats.data_sent += 1;
                if pdu.attempt() > 1 {
                    self.stats.retransmissions += 1;
                }
                Some(pdu)
            }
            Transmission::AckRequest(request) => {
                self.stats.ack_requests_sent += 1;
                Some(self.manager.create_control_frame(
                    self.address,
                    destination,
                    PduKind::AckRequest(request),
                    self.config.ack_request_nav(),
                ))
            }
        }
    }

    fn poll_reply(&mut self, now: Instant) -> Option<Pdu> {
        while let Some(&(source, ready)) = self.replies.front() {
            if ready > now {
                return None;
            }
            self.replies.pop_front();

            let reply = self
                .receivers
                .get_mut(&source)
                .and_then(ReceptionWindow::take_reply);
            if let Some(reply) = reply {
                self.stats.ack_replies_sent += 1;
                log::trace!("{}: ack-reply to {} floor {}", self.address, source, reply.floor);
                return Some(self.manager.create_control_frame(
                    self.address,
                    source,
                    PduKind::AckReply(reply),
                    Duration::ZERO,
                ));
            }
        }
        None
    }

    /// The PHY started sending `pdu`.
    pub fn on_tx_start(&mut self, pdu: &Pdu, now: Instant) {
        self.transmitting = true;
        log::trace!("{}: tx start {:?} at {}", self.address, pdu.frame_kind(), now);
    }

    /// Arms the ack timer once an own Ack-Request has left the antenna.
    pub fn on_tx_end(&mut self, pdu: &Pdu, now: Instant) {
        self.transmitting = false;

        if pdu.frame_kind() == FrameKind::AckRequest
            && pdu.source() == self.address
            && self.state == AckState::Idle
        {
            self.state = AckState::WaitingForAck;
            self.timer.arm(now, self.config.ack_timeout());
            log::debug!(
                "{}: waiting for ack from {} until {}",
                self.address,
                pdu.destination(),
                now + self.config.ack_timeout()
            );
        }
    }

    /// A frame lasting `expected` started arriving.
    pub fn on_rx_start(&mut self, expected: Duration, now: Instant) {
        self.receiving = true;

        if self.state == AckState::WaitingForAck {
            self.state = AckState::ReceivingReply;
            self.timer.extend_to(now + expected + self.config.rx_end_grace);
        }
    }

    /// The frame being received ended.
    ///
    /// While a reply is expected the grace timer is armed; the decoded frame
    /// must follow through `handle_incoming` before it expires.
    pub fn on_rx_end(&mut self, now: Instant) {
        self.receiving = false;

        if self.state == AckState::ReceivingReply {
            self.timer.arm(now, self.config.rx_end_grace);
        }
    }

    /// The frame being received was corrupt.
    pub fn on_rx_error(&mut self, now: Instant) {
        self.receiving = false;
        self.stats.rx_errors += 1;

        if self.state != AckState::ReceivingReply {
            return;
        }

        match self.config.rx_error_policy {
            RxErrorPolicy::Immediate => {
                log::debug!("{}: corrupt frame instead of ack-reply", self.address);
                self.timer.cancel();
                self.fail_burst(now);
            }
            RxErrorPolicy::AwaitTimeout => {
                self.state = AckState::WaitingForAck;
                if !self.timer.is_armed() {
                    self.fail_burst(now);
                }
            }
        }
    }

    /// Routes a decoded frame.
    ///
    /// Fails only on an Ack-Reply nobody waits for.
    pub fn handle_incoming(&mut self, pdu: Pdu, now: Instant) -> Result<()> {
        if pdu.destination() != self.address {
            self.stats.overheard += 1;
            return Ok(());
        }

        let source = pdu.source();
        match pdu.kind().clone() {
            PduKind::Data { .. } => self.receive_data(pdu),
            PduKind::AckRequest(request) => {
                let metric = self.config.size_metric;
                let events = &mut self.events;
                let stats = &mut self.stats;
                self.receivers
                    .entry(source)
                    .or_insert_with(|| ReceptionWindow::new(source, metric))
                    .process_ack_request(&request, |delivered| {
                        stats.delivered += 1;
                        events.push_back(LinkEvent::Delivered(delivered));
                    });

                if !self.replies.iter().any(|(owed, _)| *owed == source) {
                    self.replies.push_back((source, now + self.config.sifs));
                }
            }
            PduKind::AckReply(reply) => {
                let awaited = self
                    .active
                    .as_ref()
                    .is_some_and(|window| window.destination() == source && window.waiting_for_ack());
                if !awaited {
                    log::warn!("{}: unsolicited ack-reply from {}", self.address, source);
                    return Err(Error::UnsolicitedAckReply { peer: source });
                }

                self.timer.cancel();
                self.resolve(&reply.acked, now);
                self.enter_idle();
            }
        }
        Ok(())
    }

    fn receive_data(&mut self, pdu: Pdu) {
        let source = pdu.source();
        let metric = self.config.size_metric;
        let events = &mut self.events;
        let stats = &mut self.stats;

        let arrival = self
            .receivers
            .entry(source)
            .or_insert_with(|| ReceptionWindow::new(source, metric))
            .process_data(pdu, |delivered| {
                stats.delivered += 1;
                events.push_back(LinkEvent::Delivered(delivered));
            });

        if arrival == Arrival::Duplicate {
            self.stats.duplicates += 1;
        }
    }

    /// Earliest instant `handle_timeout` or `poll_transmit` has work at.
    ///
    /// The ack timer is left out while a possible reply is still on the air;
    /// `on_rx_end` or `on_rx_error` decide its fate.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let reply = self.replies.front().map(|(_, ready)| *ready);
        let timer = self.timer.deadline().filter(|_| !self.reply_on_air());
        match (timer, reply) {
            (Some(timer), Some(reply)) => Some(timer.min(reply)),
            (timer, reply) => timer.or(reply),
        }
    }

    /// Fails the burst once the ack deadline is reached.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.reply_on_air() || !self.timer.fire(now) {
            return;
        }
        if self.state == AckState::Idle {
            return;
        }

        self.stats.timeouts += 1;
        log::debug!("{}: ack timeout at {}", self.address, now);
        self.fail_burst(now);
    }

    /// Next delivery or resolution to report upwards.
    pub fn poll_event(&mut self) -> Option<LinkEvent> {
        self.events.pop_front()
    }

    fn reply_on_air(&self) -> bool {
        self.state == AckState::ReceivingReply && self.receiving
    }

    /// Resolves the burst as if the reply acknowledged nothing.
    fn fail_burst(&mut self, now: Instant) {
        self.resolve(&BTreeSet::new(), now);
        self.enter_idle();
    }

    fn resolve(&mut self, acked: &BTreeSet<SequenceNumber>, now: Instant) {
        let Some(window) = self.active.as_mut() else {
            return;
        };

        let destination = window.destination();
        let manager = &self.manager;
        let tracker = &mut self.tracker;
        let events = &mut self.events;

        window.process_acknowledgement(
            acked,
            |pdu| manager.lifetime_expired(pdu, now),
            |resolution| match resolution {
                Resolution::Acknowledged { sn, attempts } => {
                    tracker.on_success(destination, attempts);
                    events.push_back(LinkEvent::Acknowledged {
                        destination,
                        sn,
                        attempts,
                    });
                }
                Resolution::Requeued { attempts, .. } => {
                    tracker.on_failure(destination, attempts, false);
                }
                Resolution::Dropped(pdu) => {
                    tracker.on_failure(destination, pdu.attempt(), true);
                    events.push_back(LinkEvent::Dropped(pdu));
                }
            },
        );
    }

    /// Returns to `Idle`, retiring a drained window in favour of the parked one.
    fn enter_idle(&mut self) {
        self.state = AckState::Idle;

        if !self.active.as_ref().is_some_and(TransmissionWindow::is_drained) {
            return;
        }
        if let Some(window) = self.active.take() {
            self.sequences
                .persist(window.destination(), window.next_sequence());
            log::debug!("{}: retired window of {}", self.address, window.destination());
        }
        if let Some(pdu) = self.parked.take() {
            self.activate(pdu);
        }
    }
}
