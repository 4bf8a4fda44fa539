//! # Blockack - Block Acknowledgement ARQ engine
//!
//! Blockack turns an unreliable, half-duplex, shared link into a link with
//! selectively retransmitted, in-order delivery per peer. It provides:
//!
//! - **Transmission window**: bursts of data bounded by an in-flight limit,
//!   closed by a single Ack-Request
//! - **Reception window**: out-of-order buffering and cumulative replies
//! - **Link controller**: the Ack-Request / Ack-Reply handshake driven by
//!   PHY notifications and one ack timer
//! - **Lifetimes**: retry limits and per-PDU deadlines decide when a lost
//!   PDU is dropped instead of retransmitted
//! - **Wire codec**: versioned frames with a CRC32 trailer
//!
//! The engine performs no I/O and reads no clock. Every call carries the
//! current [`Instant`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Upper Layer                         │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Link Controller                       │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────────────┐   │
//! │  │ Transmission │ │  Reception   │ │   Ack Timer    │   │
//! │  │    Window    │ │   Windows    │ │                │   │
//! │  └──────────────┘ └──────────────┘ └────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                      Frame Layer                         │
//! │  ┌──────────────┐ ┌──────────────┐ ┌────────────────┐   │
//! │  │    Codec     │ │   Checksum   │ │   Sequencing   │   │
//! │  └──────────────┘ └──────────────┘ └────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                PHY driver (tx/rx notifications)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use blockack::{Address, Instant, LinkConfig, LinkController, Pdu};
//!
//! let mut link = LinkController::new(Address(1), LinkConfig::default())?;
//! link.enqueue(Pdu::data(Address(1), Address(2), b"hello".to_vec()))?;
//!
//! while let Some(frame) = link.poll_transmit(now) {
//!     link.on_tx_start(&frame, now);
//!     // put the frame on the air
//!     link.on_tx_end(&frame, now + airtime);
//! }
//! ```

#![no_std]
#![deny(unsafe_code)]
#![warn(missing_docs)]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod buffer;
pub mod config;
pub mod error;
pub mod link;
pub mod manager;
pub mod model;
pub mod reliable;
pub mod size;
pub mod time;

// Re-export commonly used types
pub use config::{LinkConfig, RxErrorPolicy};
pub use error::{Error, Rejected, Result};
pub use link::{AckState, LinkController, LinkEvent, LinkStats};
pub use manager::{DefaultManager, Manager};
pub use model::{AckReply, AckRequest, Address, FrameKind, Pdu, PduKind, SequenceNumber};
pub use reliable::{LossCounters, LossTracker};
pub use size::{ControlFrameSizes, SizeMetric};
pub use time::{Duration, Instant};

/// Frame format version
pub const VERSION: u8 = 1;

/// Default in-flight limit, in size units
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Default admission capacity, in size units
pub const DEFAULT_CAPACITY: usize = 256;

/// Default short interframe space in microseconds
pub const DEFAULT_SIFS_US: u64 = 16;

/// Default time a peer needs to prepare an Ack-Reply, in microseconds
pub const DEFAULT_ACK_PROCESSING_DELAY_US: u64 = 28;
