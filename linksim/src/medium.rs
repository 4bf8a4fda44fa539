//! Shared half-duplex medium.
//!
//! One frame is on the air at a time. After an Ack-Request the addressee
//! gets the medium SIFS after the frame ends; otherwise stations contend
//! after DIFS in round-robin order. Every receiver draws its own corruption
//! with the configured loss probability.

use anyhow::anyhow;
use blockack::{Address, Duration, FrameKind, Instant, Pdu};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::station::StationEvent;

/// Simulated time on top of the tokio clock.
///
/// The timer wheel ticks in milliseconds, so one simulated microsecond
/// lasts one tokio millisecond. Runs use paused time; the stretch costs
/// nothing.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: tokio::time::Instant,
}

const STRETCH: u32 = 1000;

impl Clock {
    pub fn start() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
        }
    }

    pub fn now(&self) -> Instant {
        Instant::from_epoch(self.epoch.elapsed() / STRETCH)
    }

    /// Tokio instant at which simulated time reaches `at`.
    pub fn deadline(&self, at: Instant) -> tokio::time::Instant {
        self.epoch + at.since_epoch() * STRETCH
    }

    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration * STRETCH).await;
    }
}

/// Air interface parameters.
#[derive(Debug, Clone, Copy)]
pub struct Air {
    pub rate_mbps: u64,
    pub preamble: Duration,
    pub sifs: Duration,
    pub slot: Duration,
    pub loss: f64,
}

impl Air {
    /// Medium time of a frame of `len` bytes.
    pub fn airtime(&self, len: usize) -> Duration {
        let bits = len as u64 * 8;
        self.preamble + Duration::from_micros(bits.div_ceil(self.rate_mbps.max(1)))
    }

    /// Idle time required before contention.
    pub fn difs(&self) -> Duration {
        self.sifs + self.slot * 2
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MediumReport {
    pub frames: u64,
    pub data_frames: u64,
    pub control_frames: u64,

    /// Receptions corrupted, counted per receiver.
    pub corrupted: u64,

    pub busy: Duration,
}

pub struct Medium {
    stations: Vec<(Address, mpsc::Sender<StationEvent>)>,
    air: Air,
    clock: Clock,
    rng: StdRng,
    turn: usize,

    /// Station owed the medium for its Ack-Reply.
    reserved: Option<usize>,

    report: MediumReport,
}

impl Medium {
    pub fn new(air: Air, clock: Clock, seed: u64) -> Self {
        Self {
            stations: Vec::new(),
            air,
            clock,
            rng: StdRng::seed_from_u64(seed),
            turn: 0,
            reserved: None,
            report: MediumReport::default(),
        }
    }

    pub fn attach(&mut self, address: Address, inbox: mpsc::Sender<StationEvent>) {
        self.stations.push((address, inbox));
    }

    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<MediumReport> {
        while !cancel.is_cancelled() {
            match self.step().await {
                Ok(()) => {}
                // stations hang up once shutdown starts
                Err(_) if cancel.is_cancelled() => break,
                Err(e) => return Err(e),
            }
        }

        debug!(
            "medium: {} frames, {} corrupted receptions",
            self.report.frames, self.report.corrupted
        );
        Ok(self.report)
    }

    async fn step(&mut self) -> anyhow::Result<()> {
        if let Some(holder) = self.reserved.take() {
            self.clock.sleep(self.air.sifs).await;
            if let Some((pdu, bytes)) = self.offer(holder, true).await? {
                return self.play(holder, pdu, bytes).await;
            }
        }

        self.clock.sleep(self.air.difs()).await;
        let count = self.stations.len();
        for i in 0..count {
            let index = (self.turn + i) % count;
            if let Some((pdu, bytes)) = self.offer(index, false).await? {
                self.turn = index + 1;
                return self.play(index, pdu, bytes).await;
            }
        }
        Ok(())
    }

    async fn offer(&self, index: usize, reply_only: bool) -> anyhow::Result<Option<(Pdu, Vec<u8>)>> {
        let (grant, granted) = oneshot::channel();
        self.send(index, StationEvent::Opportunity { grant, reply_only })
            .await?;
        granted
            .await
            .map_err(|_| anyhow!("{} dropped its opportunity", self.stations[index].0))
    }

    async fn send(&self, index: usize, event: StationEvent) -> anyhow::Result<()> {
        let (address, inbox) = &self.stations[index];
        inbox
            .send(event)
            .await
            .map_err(|_| anyhow!("{} left the medium", address))
    }

    async fn play(&mut self, sender: usize, pdu: Pdu, bytes: Vec<u8>) -> anyhow::Result<()> {
        let airtime = self.air.airtime(bytes.len());
        trace!(
            "medium: {} -> {} {:?}, {} bytes for {:?}",
            pdu.source(),
            pdu.destination(),
            pdu.frame_kind(),
            bytes.len(),
            airtime
        );

        for index in self.receivers(sender) {
            self.send(index, StationEvent::RxStart { airtime }).await?;
        }

        self.clock.sleep(airtime).await;
        self.send(sender, StationEvent::TxEnd).await?;

        for index in self.receivers(sender) {
            let mut frame = bytes.clone();
            if self.rng.gen_bool(self.air.loss) {
                let at = self.rng.gen_range(0..frame.len());
                frame[at] ^= 1u8 << self.rng.gen_range(0..8u32);
                self.report.corrupted += 1;
            }
            self.send(index, StationEvent::RxEnd { frame }).await?;
        }

        self.report.frames += 1;
        self.report.busy += airtime;
        if pdu.frame_kind().is_control() {
            self.report.control_frames += 1;
        } else {
            self.report.data_frames += 1;
        }

        if pdu.frame_kind() == FrameKind::AckRequest {
            self.reserved = self
                .stations
                .iter()
                .position(|(address, _)| *address == pdu.destination());
        }
        Ok(())
    }

    fn receivers(&self, sender: usize) -> impl Iterator<Item = usize> + use<> {
        (0..self.stations.len()).filter(move |index| *index != sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn air() -> Air {
        Air {
            rate_mbps: 54,
            preamble: Duration::from_micros(20),
            sifs: Duration::from_micros(16),
            slot: Duration::from_micros(9),
            loss: 0.0,
        }
    }

    #[test]
    fn test_airtime_rounds_up() {
        let air = air();
        // 54 bits per microsecond
        assert_eq!(air.airtime(27), Duration::from_micros(24));
        assert_eq!(air.airtime(28), Duration::from_micros(25));
        assert_eq!(air.difs(), Duration::from_micros(34));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_stretch() {
        let clock = Clock::start();
        clock.sleep(Duration::from_micros(44)).await;

        assert_eq!(clock.now(), Instant::from_micros(44));
        assert_eq!(
            clock.deadline(Instant::from_micros(100)),
            clock.epoch + std::time::Duration::from_millis(100)
        );
    }
}
