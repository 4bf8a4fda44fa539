//! Wire encoding of PDUs.
//!
//! # Frame Format
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |     Kind      |     Source Address ...        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  ... Source   |        Destination Address ...                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | ... Dest      |           NAV (microseconds) ...              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | ... NAV       |   Sequence Number / Floor (64 bits) ...       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              ...                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | ... SN        |          Body Length          |     Body...   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      CRC32 (trailer)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Body length counts payload bytes for data frames, acknowledged SNs
//! (eight bytes each) for Ack-Replies, and is zero for Ack-Requests.
//! All integers are big-endian. The CRC covers every byte before it.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use super::{AckReply, AckRequest, Address, FrameKind, Pdu, PduKind, SequenceNumber};
use crate::error::{Error, Result};
use crate::time::Duration;
use crate::VERSION;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// CRC trailer size in bytes.
pub const CRC_SIZE: usize = 4;

/// Largest body a frame can describe.
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

const SN_SIZE: usize = 8;

/// Number of bytes `pdu` occupies on the wire.
pub fn encoded_len(pdu: &Pdu) -> usize {
    let body = match pdu.kind() {
        PduKind::Data { .. } => pdu.payload().len(),
        PduKind::AckRequest(_) => 0,
        PduKind::AckReply(reply) => reply.acked.len() * SN_SIZE,
    };
    HEADER_SIZE + body + CRC_SIZE
}

/// Serializes a PDU into a new buffer.
pub fn encode(pdu: &Pdu) -> Result<Vec<u8>> {
    let (sn, body_len) = match pdu.kind() {
        PduKind::Data { sn } => (*sn, pdu.payload().len()),
        PduKind::AckRequest(request) => (request.floor, 0),
        PduKind::AckReply(reply) => (reply.floor, reply.acked.len()),
    };
    if body_len > MAX_BODY_LEN {
        return Err(Error::PayloadTooLarge(body_len));
    }

    let nav = u32::try_from(pdu.nav().as_micros()).unwrap_or(u32::MAX);

    let mut buf = Vec::with_capacity(encoded_len(pdu));
    buf.push(VERSION);
    buf.push(pdu.frame_kind() as u8);
    buf.extend_from_slice(&pdu.source().0.to_be_bytes());
    buf.extend_from_slice(&pdu.destination().0.to_be_bytes());
    buf.extend_from_slice(&nav.to_be_bytes());
    buf.extend_from_slice(&sn.get().to_be_bytes());
    buf.extend_from_slice(&(body_len as u16).to_be_bytes());

    match pdu.kind() {
        PduKind::Data { .. } => buf.extend_from_slice(pdu.payload()),
        PduKind::AckRequest(_) => {}
        PduKind::AckReply(reply) => {
            for acked in &reply.acked {
                buf.extend_from_slice(&acked.get().to_be_bytes());
            }
        }
    }

    let checksum = crc32fast::hash(&buf);
    buf.extend_from_slice(&checksum.to_be_bytes());

    log::trace!(
        "encoded {:?} {} -> {}, {} bytes",
        pdu.frame_kind(),
        pdu.source(),
        pdu.destination(),
        buf.len()
    );

    Ok(buf)
}

/// Parses a frame produced by [`encode`].
pub fn decode(buf: &[u8]) -> Result<Pdu> {
    if buf.len() < HEADER_SIZE + CRC_SIZE {
        return Err(Error::FrameTooShort {
            got: buf.len(),
            need: HEADER_SIZE + CRC_SIZE,
        });
    }

    let (covered, trailer) = buf.split_at(buf.len() - CRC_SIZE);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = crc32fast::hash(covered);
    if stored != computed {
        return Err(Error::ChecksumMismatch {
            got: stored,
            expected: computed,
        });
    }

    if covered[0] != VERSION {
        return Err(Error::InvalidVersion(covered[0]));
    }
    let kind = FrameKind::from_u8(covered[1]).ok_or(Error::InvalidFrameKind(covered[1]))?;

    let source = Address(read_u32(&covered[2..6]));
    let destination = Address(read_u32(&covered[6..10]));
    let nav = Duration::from_micros(u64::from(read_u32(&covered[10..14])));
    let sn = SequenceNumber(read_u64(&covered[14..22]));
    let body_len = u16::from_be_bytes([covered[22], covered[23]]) as usize;
    let body = &covered[HEADER_SIZE..];

    let expected_body = match kind {
        FrameKind::Data => body_len,
        FrameKind::AckRequest => 0,
        FrameKind::AckReply => body_len * SN_SIZE,
    };
    if body.len() != expected_body {
        return Err(Error::FrameTooShort {
            got: buf.len(),
            need: HEADER_SIZE + expected_body + CRC_SIZE,
        });
    }

    let (kind, payload) = match kind {
        FrameKind::Data => (PduKind::Data { sn }, body.to_vec()),
        FrameKind::AckRequest => (PduKind::AckRequest(AckRequest { floor: sn }), Vec::new()),
        FrameKind::AckReply => {
            let acked: BTreeSet<SequenceNumber> = body
                .chunks_exact(SN_SIZE)
                .map(|chunk| SequenceNumber(read_u64(chunk)))
                .collect();
            (PduKind::AckReply(AckReply { floor: sn, acked }), Vec::new())
        }
    };

    Ok(Pdu::from_wire(kind, source, destination, payload, nav))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_be_bytes(raw)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_be_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sample_data() -> Pdu {
        let mut pdu = Pdu::data(Address(1), Address(2), b"block ack".to_vec());
        pdu.assign_sequence(SequenceNumber(41));
        pdu
    }

    #[test]
    fn test_data_frame_roundtrip() {
        let pdu = sample_data();
        let buf = encode(&pdu).unwrap();
        assert_eq!(buf.len(), encoded_len(&pdu));

        let decoded = decode(&buf).unwrap();
        assert_eq!(decoded.sn(), Some(SequenceNumber(41)));
        assert_eq!(decoded.source(), Address(1));
        assert_eq!(decoded.destination(), Address(2));
        assert_eq!(decoded.payload(), b"block ack");
    }

    #[test]
    fn test_ack_reply_carries_acked_set() {
        let acked = [3u64, 4, 9].into_iter().map(SequenceNumber).collect();
        let reply = Pdu::control(
            Address(2),
            Address(1),
            PduKind::AckReply(AckReply {
                floor: SequenceNumber(3),
                acked,
            }),
            Duration::ZERO,
        );

        let buf = encode(&reply).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 3 * 8 + CRC_SIZE);

        let decoded = decode(&buf).unwrap();
        match decoded.kind() {
            PduKind::AckReply(body) => {
                assert_eq!(body.floor, SequenceNumber(3));
                let sns: Vec<u64> = body.acked.iter().map(SequenceNumber::get).collect();
                assert_eq!(sns, vec![3, 4, 9]);
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_ack_request_keeps_nav() {
        let request = Pdu::control(
            Address(1),
            Address(2),
            PduKind::AckRequest(AckRequest {
                floor: SequenceNumber(17),
            }),
            Duration::from_micros(60),
        );

        let decoded = decode(&encode(&request).unwrap()).unwrap();
        assert_eq!(decoded.nav(), Duration::from_micros(60));
        assert_eq!(
            decoded.kind(),
            &PduKind::AckRequest(AckRequest {
                floor: SequenceNumber(17)
            })
        );
    }

    #[test]
    fn test_checksum_verification() {
        let mut buf = encode(&sample_data()).unwrap();

        // Corrupt one payload byte
        buf[HEADER_SIZE] ^= 0xFF;

        assert!(matches!(decode(&buf), Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncated_frame() {
        let buf = encode(&sample_data()).unwrap();
        assert!(matches!(
            decode(&buf[..10]),
            Err(Error::FrameTooShort { got: 10, .. })
        ));
    }
}
