//! PDU record handled by the engine.
//!
//! A PDU is built once per logical frame. The engine only ever touches two
//! of its fields after admission: the sequence number (assigned by the
//! transmission window) and the attempt counter. The copy handed to the PHY
//! is a clone, never an alias of the queued record.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use super::{Address, SequenceNumber};
use crate::time::{Duration, Instant};

/// Discriminant of a PDU, as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Data frame carrying payload.
    Data = 0x01,

    /// Acknowledgement request closing a burst.
    AckRequest = 0x02,

    /// Acknowledgement reply answering a request.
    AckReply = 0x03,
}

impl FrameKind {
    /// Parses the wire discriminant.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Data),
            0x02 => Some(Self::AckRequest),
            0x03 => Some(Self::AckReply),
            _ => None,
        }
    }

    /// True for Ack-Request and Ack-Reply.
    pub const fn is_control(&self) -> bool {
        !matches!(self, Self::Data)
    }
}

/// Body of an Acknowledgement-Request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRequest {
    /// Everything below this SN has been abandoned by the sender.
    pub floor: SequenceNumber,
}

/// Body of an Acknowledgement-Reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckReply {
    /// Cumulative floor seen by the receiver.
    pub floor: SequenceNumber,

    /// SNs received since the previous reply.
    pub acked: BTreeSet<SequenceNumber>,
}

/// Kind-specific part of a PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PduKind {
    /// Upper-layer data.
    Data { sn: SequenceNumber },
    /// Request closing a burst.
    AckRequest(AckRequest),
    /// Reply to a request.
    AckReply(AckReply),
}

impl PduKind {
    pub fn frame_kind(&self) -> FrameKind {
        match self {
            PduKind::Data { .. } => FrameKind::Data,
            PduKind::AckRequest(_) => FrameKind::AckRequest,
            PduKind::AckReply(_) => FrameKind::AckReply,
        }
    }
}

/// One logical frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    kind: PduKind,
    source: Address,
    destination: Address,
    payload: Vec<u8>,
    deadline: Option<Instant>,
    nav: Duration,
    attempt: u32,
}

impl Pdu {
    /// Creates a data PDU. Its sequence number is assigned on admission.
    pub fn data(source: Address, destination: Address, payload: Vec<u8>) -> Self {
        Self {
            kind: PduKind::Data {
                sn: SequenceNumber::ZERO,
            },
            source,
            destination,
            payload,
            deadline: None,
            nav: Duration::ZERO,
            attempt: 0,
        }
    }

    /// Creates a control PDU without payload.
    pub fn control(source: Address, destination: Address, kind: PduKind, nav: Duration) -> Self {
        Self {
            kind,
            source,
            destination,
            payload: Vec::new(),
            deadline: None,
            nav,
            attempt: 0,
        }
    }

    /// Sets the absolute lifetime deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Kind-specific content.
    pub fn kind(&self) -> &PduKind {
        &self.kind
    }

    pub fn frame_kind(&self) -> FrameKind {
        self.kind.frame_kind()
    }

    /// True for data PDUs.
    pub fn is_data(&self) -> bool {
        matches!(self.kind, PduKind::Data { .. })
    }

    /// Sequence number of a data PDU.
    pub fn sn(&self) -> Option<SequenceNumber> {
        match self.kind {
            PduKind::Data { sn } => Some(sn),
            _ => None,
        }
    }

    /// Transmitter address.
    pub fn source(&self) -> Address {
        self.source
    }

    /// Receiver address.
    pub fn destination(&self) -> Address {
        self.destination
    }

    /// Upper-layer bytes, empty for control frames.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the PDU for its payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Absolute lifetime deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replaces or clears the lifetime deadline.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// True once `now` reached the deadline.
    pub fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Medium reservation announced by this frame.
    pub fn nav(&self) -> Duration {
        self.nav
    }

    /// Transmission attempt this PDU is on (1 for the first transmission).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn assign_sequence(&mut self, sn: SequenceNumber) {
        if let PduKind::Data { sn: slot } = &mut self.kind {
            *slot = sn;
        }
        self.attempt = 1;
    }

    pub(crate) fn count_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub(crate) fn from_wire(
        kind: PduKind,
        source: Address,
        destination: Address,
        payload: Vec<u8>,
        nav: Duration,
    ) -> Self {
        Self {
            kind,
            source,
            destination,
            payload,
            deadline: None,
            nav,
            attempt: 0,
        }
    }
}
