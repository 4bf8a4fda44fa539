//! Size accounting.
//!
//! Windows and admission control measure PDUs through a [`SizeMetric`]
//! chosen at construction: either payload bytes or plain PDU counts.

use crate::model::{FrameKind, Pdu};

/// How the logical size of a PDU is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMetric {
    /// Payload length in bytes.
    Bytes,

    /// Every PDU counts as one unit.
    #[default]
    Units,
}

impl SizeMetric {
    /// Logical size of `pdu`.
    pub fn size(&self, pdu: &Pdu) -> usize {
        match self {
            SizeMetric::Bytes => pdu.payload().len(),
            SizeMetric::Units => 1,
        }
    }

    /// Summed size of a sequence of PDUs.
    pub fn total<'a, I>(&self, pdus: I) -> usize
    where
        I: IntoIterator<Item = &'a Pdu>,
    {
        pdus.into_iter().map(|pdu| self.size(pdu)).sum()
    }
}

/// Bit widths of the control frames.
///
/// These are opaque constants for the engine; they are only reported to
/// whoever accounts airtime or overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrameSizes {
    /// Ack-Request length in bits.
    pub ack_request_bits: u32,
    /// Ack-Reply length in bits.
    pub ack_reply_bits: u32,
}

impl ControlFrameSizes {
    /// Creates custom widths.
    pub const fn new(ack_request_bits: u32, ack_reply_bits: u32) -> Self {
        Self {
            ack_request_bits,
            ack_reply_bits,
        }
    }

    /// Configured width of a control frame, `None` for data.
    pub const fn bits(&self, kind: FrameKind) -> Option<u32> {
        match kind {
            FrameKind::AckRequest => Some(self.ack_request_bits),
            FrameKind::AckReply => Some(self.ack_reply_bits),
            FrameKind::Data => None,
        }
    }
}

impl Default for ControlFrameSizes {
    // compressed BlockAckReq / BlockAck frames, FCS included
    fn default() -> Self {
        Self::new(192, 256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Address;
    use alloc::vec;

    #[test]
    fn test_metrics() {
        let small = Pdu::data(Address(1), Address(2), vec![0; 10]);
        let large = Pdu::data(Address(1), Address(2), vec![0; 1500]);

        assert_eq!(SizeMetric::Bytes.size(&small), 10);
        assert_eq!(SizeMetric::Units.size(&large), 1);
        assert_eq!(SizeMetric::Bytes.total([&small, &large]), 1510);
        assert_eq!(SizeMetric::Units.total([&small, &large]), 2);
    }

    #[test]
    fn test_control_frame_bits() {
        let sizes = ControlFrameSizes::default();
        assert_eq!(sizes.bits(FrameKind::AckRequest), Some(192));
        assert_eq!(sizes.bits(FrameKind::AckReply), Some(256));
        assert_eq!(sizes.bits(FrameKind::Data), None);
    }
}
