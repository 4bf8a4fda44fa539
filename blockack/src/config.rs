//! Link configuration.

use crate::error::{Error, Result};
use crate::size::{ControlFrameSizes, SizeMetric};
use crate::time::Duration;
use crate::{
    DEFAULT_ACK_PROCESSING_DELAY_US, DEFAULT_CAPACITY, DEFAULT_MAX_IN_FLIGHT, DEFAULT_SIFS_US,
};

/// What happens when the frame received while waiting for a reply is corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RxErrorPolicy {
    /// Treat the corrupt frame as the missing reply and fail right away.
    #[default]
    Immediate,

    /// Go back to waiting and let the armed ack timer decide.
    AwaitTimeout,
}

/// Link controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// In-flight cap of a transmission window, in size units.
    pub max_in_flight: usize,

    /// Admission limit over every buffered PDU, in size units.
    pub capacity: usize,

    /// How PDU sizes are counted for both limits.
    pub size_metric: SizeMetric,

    /// Request an acknowledgement as soon as any data is in flight.
    pub impatient_ack_request: bool,

    /// Request an acknowledgement when the pending queue runs dry, even if
    /// the in-flight queue is not full.
    pub ack_request_on_drain: bool,

    /// Short interframe space before a reply.
    pub sifs: Duration,

    /// Time the peer needs to prepare a reply.
    pub ack_processing_delay: Duration,

    /// Delay granted after a reception ends for the decoded frame to arrive.
    pub rx_end_grace: Duration,

    /// Medium time of an Ack-Reply, announced in the Ack-Request NAV.
    pub reply_airtime: Duration,

    /// Retransmissions allowed per PDU, `None` to rely on lifetimes only.
    pub max_retransmissions: Option<u32>,

    /// Reaction to a corrupt frame while a reply is expected.
    pub rx_error_policy: RxErrorPolicy,

    /// Bit widths reported for control frames.
    pub control_frame_sizes: ControlFrameSizes,
}

impl LinkConfig {
    /// Default configuration.
    pub fn new() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            capacity: DEFAULT_CAPACITY,
            size_metric: SizeMetric::Units,
            impatient_ack_request: false,
            ack_request_on_drain: true,
            sifs: Duration::from_micros(DEFAULT_SIFS_US),
            ack_processing_delay: Duration::from_micros(DEFAULT_ACK_PROCESSING_DELAY_US),
            rx_end_grace: Duration::ZERO,
            reply_airtime: Duration::from_micros(44),
            max_retransmissions: Some(7),
            rx_error_policy: RxErrorPolicy::Immediate,
            control_frame_sizes: ControlFrameSizes::default(),
        }
    }

    /// Sets the in-flight limit.
    pub fn with_max_in_flight(mut self, size: usize) -> Self {
        self.max_in_flight = size;
        self
    }

    /// Sets the admission capacity.
    pub fn with_capacity(mut self, size: usize) -> Self {
        self.capacity = size;
        self
    }

    /// Sets the size metric.
    pub fn with_size_metric(mut self, metric: SizeMetric) -> Self {
        self.size_metric = metric;
        self
    }

    /// Requests an acknowledgement after every data frame.
    pub fn with_impatient_ack_request(mut self, impatient: bool) -> Self {
        self.impatient_ack_request = impatient;
        self
    }

    /// Closes a burst once the pending queue runs empty.
    pub fn with_ack_request_on_drain(mut self, on_drain: bool) -> Self {
        self.ack_request_on_drain = on_drain;
        self
    }

    /// Sets the SIFS.
    pub fn with_sifs(mut self, sifs: Duration) -> Self {
        self.sifs = sifs;
        self
    }

    /// Sets the peer processing allowance.
    pub fn with_ack_processing_delay(mut self, delay: Duration) -> Self {
        self.ack_processing_delay = delay;
        self
    }

    /// Sets the grace after a reception ends.
    pub fn with_rx_end_grace(mut self, grace: Duration) -> Self {
        self.rx_end_grace = grace;
        self
    }

    /// Sets the Ack-Reply airtime used for the NAV.
    pub fn with_reply_airtime(mut self, airtime: Duration) -> Self {
        self.reply_airtime = airtime;
        self
    }

    /// Sets the retransmission limit.
    pub fn with_max_retransmissions(mut self, limit: Option<u32>) -> Self {
        self.max_retransmissions = limit;
        self
    }

    /// Sets the corrupt-reply policy.
    pub fn with_rx_error_policy(mut self, policy: RxErrorPolicy) -> Self {
        self.rx_error_policy = policy;
        self
    }

    /// Sets the control frame bit widths.
    pub fn with_control_frame_sizes(mut self, sizes: ControlFrameSizes) -> Self {
        self.control_frame_sizes = sizes;
        self
    }

    /// Time to wait for a reply after an Ack-Request left the antenna.
    pub fn ack_timeout(&self) -> Duration {
        self.sifs + self.ack_processing_delay
    }

    /// NAV carried by an Ack-Request: the SIFS gap plus the reply itself.
    pub fn ack_request_nav(&self) -> Duration {
        self.sifs + self.reply_airtime
    }

    /// Checks the limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::InvalidConfig("max_in_flight must be positive"));
        }
        if self.capacity < self.max_in_flight {
            return Err(Error::InvalidConfig(
                "capacity must be at least max_in_flight",
            ));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = LinkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.ack_timeout(),
            Duration::from_micros(DEFAULT_SIFS_US + DEFAULT_ACK_PROCESSING_DELAY_US)
        );
    }

    #[test]
    fn test_builder_and_validation() {
        let config = LinkConfig::new()
            .with_max_in_flight(8)
            .with_capacity(4)
            .with_size_metric(SizeMetric::Bytes);
        assert_eq!(config.size_metric, SizeMetric::Bytes);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = config.with_max_in_flight(0);
        assert!(config.validate().is_err());
    }
}
