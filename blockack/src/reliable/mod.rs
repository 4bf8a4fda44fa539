//! Reliability helpers.
//!
//! This module provides:
//! - AckTimer: the cancel-and-rearm ack timeout
//! - LossTracker / LossCounters: per-PDU outcome reporting

mod loss;
mod timer;

pub use loss::{LossCounters, LossTracker};
pub use timer::AckTimer;
