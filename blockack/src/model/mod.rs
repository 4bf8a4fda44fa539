//! Core data structures of the engine.
//!
//! This module contains the building blocks shared by every layer:
//! - Address: link-layer station address
//! - SequenceNumber / SequenceRegistry: per-destination numbering
//! - Pdu: the frame record queued, transmitted and delivered
//! - frame: wire encoding with a CRC32 trailer

mod address;
pub mod frame;
mod pdu;
mod sequence;

pub use address::Address;
pub use pdu::{AckReply, AckRequest, FrameKind, Pdu, PduKind};
pub use sequence::{SequenceNumber, SequenceRegistry};
