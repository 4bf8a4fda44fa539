//! Sequence numbers and the per-destination allocator.
//!
//! Sequence numbers are plain monotonic counters. No modulo arithmetic is
//! applied: ordering is integer ordering.

use alloc::collections::BTreeMap;
use core::fmt;

use super::Address;

/// Sequence number of a data PDU within one (source, destination) stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// First SN of every stream.
    pub const ZERO: Self = Self(0);

    /// Raw counter value.
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// The following sequence number.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Remembers the next sequence number of every destination served so far.
///
/// A transmission window takes its starting number from here when it is
/// created and hands its next number back when it is retired, so numbering
/// never restarts for a destination that becomes active again.
#[derive(Debug, Default)]
pub struct SequenceRegistry {
    next: BTreeMap<Address, SequenceNumber>,
}

impl SequenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequence number for `destination`, zero if never served.
    pub fn next_for(&self, destination: Address) -> SequenceNumber {
        self.next
            .get(&destination)
            .copied()
            .unwrap_or(SequenceNumber::ZERO)
    }

    /// Persists the next sequence number of a retired window.
    pub fn persist(&mut self, destination: Address, next: SequenceNumber) {
        let entry = self.next.entry(destination).or_insert(next);
        if next > *entry {
            *entry = next;
        }
    }

    /// Destinations remembered.
    pub fn len(&self) -> usize {
        self.next.len()
    }

    /// True before any window was retired.
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}
