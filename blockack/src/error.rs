//! Engine errors.

use thiserror::Error;

use crate::model::{Address, Pdu};

/// Errors raised by the Block-ACK engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Admission refused: buffered size already reached the configured capacity.
    #[error("buffered size {buffered} reached capacity {capacity}")]
    BufferFull { buffered: usize, capacity: usize },

    /// The PDU can never fit into the in-flight window.
    #[error("pdu of size {size} exceeds the in-flight limit {max_in_flight}")]
    Oversized { size: usize, max_in_flight: usize },

    /// Another destination already occupies the look-ahead slot.
    #[error("look-ahead slot is taken by {parked}, cannot queue for {destination}")]
    LookAheadBusy { parked: Address, destination: Address },

    /// Only data PDUs may be queued by the upper layer.
    #[error("only data pdus can be queued for transmission")]
    NotData,

    /// An Ack-Reply arrived while no transmission window was waiting for it.
    #[error("unsolicited ack-reply from {peer}")]
    UnsolicitedAckReply { peer: Address },

    /// Configuration values are inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Frame shorter than its header and trailer.
    #[error("frame too short: got {got} bytes, need at least {need}")]
    FrameTooShort { got: usize, need: usize },

    /// Frame written by another format version.
    #[error("unsupported frame version {0}")]
    InvalidVersion(u8),

    /// Kind byte names no known frame.
    #[error("unknown frame kind {0:#04x}")]
    InvalidFrameKind(u8),

    /// Frame corrupted on the way.
    #[error("crc32 got {got:#010x}, expected {expected:#010x}")]
    ChecksumMismatch { got: u32, expected: u32 },

    /// Payload length does not fit the length field.
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
}

/// A PDU the controller refused to admit, handed back to the caller.
#[derive(Debug, Error)]
#[error("pdu for {} rejected: {error}", .pdu.destination())]
pub struct Rejected {
    /// Why admission failed.
    #[source]
    pub error: Error,
    /// The refused PDU, unchanged.
    pub pdu: Pdu,
}

/// Result with the engine [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
