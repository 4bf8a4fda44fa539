//! Per-peer windows.
//!
//! This module provides:
//! - TransmissionWindow: pending and in-flight queues of the active destination
//! - ReceptionWindow: reordering buffer and reply builder of one source

mod reception;
mod transmit;

pub use reception::{Arrival, ReceptionWindow};
pub use transmit::{AckSummary, Resolution, Selection, Transmission, TransmissionWindow};
