//! Reception window of one source.

use alloc::collections::{BTreeMap, BTreeSet};

use crate::model::{AckReply, AckRequest, Address, Pdu, SequenceNumber};
use crate::size::SizeMetric;

/// How an incoming data PDU was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Delivered together with this many buffered successors.
    InOrder { released: usize },

    /// Held until the gap before it closes.
    Buffered,

    /// Already delivered or already buffered.
    Duplicate,
}

/// Reorders the data stream of one source and builds its Ack-Replies.
#[derive(Debug)]
pub struct ReceptionWindow {
    source: Address,

    /// Never decreases.
    waiting_for: SequenceNumber,

    out_of_order: BTreeMap<SequenceNumber, Pdu>,

    /// SNs received since the last reply, duplicates included.
    pending_ack: BTreeSet<SequenceNumber>,

    pending_reply: Option<AckReply>,

    metric: SizeMetric,
}

impl ReceptionWindow {
    /// Creates an empty window expecting SN 0 from `source`.
    pub fn new(source: Address, metric: SizeMetric) -> Self {
        Self {
            source,
            waiting_for: SequenceNumber::ZERO,
            out_of_order: BTreeMap::new(),
            pending_ack: BTreeSet::new(),
            pending_reply: None,
            metric,
        }
    }

    /// Peer whose data this window reorders.
    pub fn source(&self) -> Address {
        self.source
    }

    /// Next SN expected in order.
    pub fn waiting_for(&self) -> SequenceNumber {
        self.waiting_for
    }

    /// Out-of-order PDUs held back.
    pub fn buffered_len(&self) -> usize {
        self.out_of_order.len()
    }

    /// Size of the out-of-order buffer.
    pub fn buffered_size(&self) -> usize {
        self.metric.total(self.out_of_order.values())
    }

    /// True when an Ack-Reply is ready to be taken.
    pub fn has_reply(&self) -> bool {
        self.pending_reply.is_some()
    }

    /// Records `pdu` and hands every PDU that became in order to `deliver`.
    pub fn process_data<F>(&mut self, pdu: Pdu, mut deliver: F) -> Arrival
    where
        F: FnMut(Pdu),
    {
        let Some(sn) = pdu.sn() else {
            return Arrival::Duplicate;
        };
        // duplicates are acknowledged again; the previous reply may be lost
        self.pending_ack.insert(sn);

        if sn == self.waiting_for {
            deliver(pdu);
            self.waiting_for = sn.next();
            let released = self.purge(&mut deliver);
            log::trace!("{}: delivered {} (+{})", self.source, sn, released);
            Arrival::InOrder { released }
        } else if sn < self.waiting_for || self.out_of_order.contains_key(&sn) {
            log::trace!("{}: duplicate {}", self.source, sn);
            Arrival::Duplicate
        } else {
            log::trace!(
                "{}: buffered {} while waiting for {}",
                self.source,
                sn,
                self.waiting_for
            );
            self.out_of_order.insert(sn, pdu);
            Arrival::Buffered
        }
    }

    /// Delivers the buffered run starting at `waiting_for`.
    fn purge<F>(&mut self, deliver: &mut F) -> usize
    where
        F: FnMut(Pdu),
    {
        let mut released = 0;
        while let Some(pdu) = self.out_of_order.remove(&self.waiting_for) {
            deliver(pdu);
            self.waiting_for = self.waiting_for.next();
            released += 1;
        }
        released
    }

    /// Applies the sender's floor and prepares the Ack-Reply.
    ///
    /// Everything buffered below the floor is delivered first, in SN order,
    /// since the sender will never fill the gaps before it.
    pub fn process_ack_request<F>(&mut self, request: &AckRequest, mut deliver: F)
    where
        F: FnMut(Pdu),
    {
        let floor = request.floor;

        let above = self.out_of_order.split_off(&floor);
        let below = core::mem::replace(&mut self.out_of_order, above);
        let flushed = below.len();
        below.into_values().for_each(&mut deliver);

        if floor > self.waiting_for {
            self.waiting_for = floor;
        }
        let released = self.purge(&mut deliver);

        self.pending_ack = self.pending_ack.split_off(&floor);

        let lowest = self
            .pending_ack
            .first()
            .copied()
            .unwrap_or(self.waiting_for);
        let reply = AckReply {
            floor: lowest.min(self.waiting_for),
            acked: core::mem::take(&mut self.pending_ack),
        };

        log::debug!(
            "{}: ack-request floor {}, flushed {}, released {}, acking {}",
            self.source,
            floor,
            flushed,
            released,
            reply.acked.len()
        );
        self.pending_reply = Some(reply);
    }

    /// Takes the reply built by the last Ack-Request.
    pub fn take_reply(&mut self) -> Option<AckReply> {
        self.pending_reply.take()
    }
}
