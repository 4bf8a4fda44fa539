//! Block-ACK link simulator.
//!
//! Runs several stations over one shared, lossy, half-duplex medium. Each
//! station is a tokio task driving a `blockack` link controller; the medium
//! is another task serializing transmissions. Time is paused, so a run is
//! deterministic for a given seed.

mod medium;
mod station;

use anyhow::{Context, ensure};
use blockack::{Address, Duration, LinkConfig};
use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use medium::{Air, Clock, Medium, MediumReport};
use station::{Outcome, Station, StationReport, traffic};

const INBOX_DEPTH: usize = 64;

#[derive(Parser, Debug, Clone)]
#[command(name = "linksim")]
#[command(about = "Simulate Block-ACK links over a shared lossy medium")]
struct Args {
    /// Number of stations sharing the medium
    #[arg(short, long, default_value_t = 3)]
    stations: u32,

    /// PDUs offered by every station
    #[arg(short, long, default_value_t = 200)]
    count: usize,

    /// Payload size in bytes
    #[arg(long, default_value_t = 256)]
    payload: usize,

    /// Probability that a receiver gets a corrupted frame
    #[arg(short, long, default_value_t = 0.05)]
    loss: f64,

    /// Seed for traffic and corruption
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// In-flight limit per destination, in PDUs
    #[arg(long, default_value_t = 16)]
    max_in_flight: usize,

    /// Admission capacity per station, in PDUs
    #[arg(long, default_value_t = 64)]
    capacity: usize,

    /// Retransmissions before a PDU is dropped
    #[arg(long, default_value_t = 7)]
    max_retransmissions: u32,

    /// Lifetime of a PDU from admission, in microseconds
    #[arg(long)]
    lifetime_us: Option<u64>,

    /// Request an acknowledgement after every data frame
    #[arg(long)]
    impatient: bool,

    /// PHY rate in Mbit/s
    #[arg(long, default_value_t = 54)]
    rate_mbps: u64,

    /// Simulated time limit in milliseconds
    #[arg(long, default_value_t = 1000)]
    time_limit_ms: u64,
}

#[derive(Debug)]
struct Summary {
    stations: Vec<StationReport>,
    medium: MediumReport,
    elapsed: Duration,
    offered: usize,
    acknowledged: usize,
    dropped: usize,
}

impl Summary {
    fn completed(&self) -> bool {
        self.acknowledged + self.dropped == self.offered
    }

    fn delivered(&self) -> u64 {
        self.stations.iter().map(|s| s.delivered).sum()
    }

    fn out_of_order(&self) -> u64 {
        self.stations.iter().map(|s| s.out_of_order).sum()
    }

    fn log(&self) {
        for report in &self.stations {
            info!(
                "{}: sent {} data ({:.1}% retx), {} ack-req, {} ack-reply, {} timeouts, {} rx errors, delivered {} ({} dup), success {:.1}% in {:.2} attempts",
                report.address,
                report.stats.data_sent,
                report.stats.retransmission_rate(),
                report.stats.ack_requests_sent,
                report.stats.ack_replies_sent,
                report.stats.timeouts,
                report.stats.rx_errors,
                report.delivered,
                report.stats.duplicates,
                report.losses.success_rate(),
                report.losses.mean_attempts()
            );
        }

        let bytes: u64 = self.stations.iter().map(|s| s.delivered_bytes).sum();
        let goodput = if self.elapsed.is_zero() {
            0.0
        } else {
            bytes as f64 * 8.0 / self.elapsed.as_micros() as f64
        };
        let busy = if self.elapsed.is_zero() {
            0.0
        } else {
            self.medium.busy.as_secs_f64() / self.elapsed.as_secs_f64() * 100.0
        };

        info!("=== Simulation Complete ===");
        info!(
            "Offered: {}, acknowledged: {}, dropped: {}",
            self.offered, self.acknowledged, self.dropped
        );
        info!(
            "Frames: {} ({} data, {} control), corrupted receptions: {}",
            self.medium.frames,
            self.medium.data_frames,
            self.medium.control_frames,
            self.medium.corrupted
        );
        info!(
            "Simulated time: {} us, medium busy {:.1}%, goodput {:.2} Mbit/s",
            self.elapsed.as_micros(),
            busy,
            goodput
        );
    }
}

async fn simulate(args: &Args) -> anyhow::Result<Summary> {
    ensure!(args.stations >= 2, "at least two stations are needed");
    ensure!(
        (0.0..=1.0).contains(&args.loss),
        "loss must be a probability, got {}",
        args.loss
    );

    let config = LinkConfig::new()
        .with_max_in_flight(args.max_in_flight)
        .with_capacity(args.capacity)
        .with_impatient_ack_request(args.impatient)
        .with_max_retransmissions(Some(args.max_retransmissions));
    config.validate().context("invalid link configuration")?;

    let air = Air {
        rate_mbps: args.rate_mbps,
        preamble: Duration::from_micros(20),
        sifs: config.sifs,
        slot: Duration::from_micros(9),
        loss: args.loss,
    };

    let clock = Clock::start();
    let cancel = CancellationToken::new();
    let (outcome_tx, mut outcomes) = mpsc::unbounded_channel();
    let mut medium = Medium::new(air, clock, args.seed);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let addresses: Vec<Address> = (1..=args.stations).map(Address).collect();
    let mut stations = Vec::new();
    for &address in &addresses {
        let (inbox_tx, inbox) = mpsc::channel(INBOX_DEPTH);
        medium.attach(address, inbox_tx);

        let peers: Vec<Address> = addresses.iter().copied().filter(|a| *a != address).collect();
        let destinations: Vec<Address> = (0..args.count)
            .map(|_| peers[rng.gen_range(0..peers.len())])
            .collect();

        let mut station = Station::new(address, config.clone(), inbox, outcome_tx.clone(), clock)?
            .with_lifetime(args.lifetime_us.map(Duration::from_micros));
        station.offer(traffic(address, destinations, args.payload));

        let token = cancel.clone();
        stations.push(tokio::spawn(async move {
            let result = station.run(token.clone()).await;
            if result.is_err() {
                token.cancel();
            }
            result
        }));
    }
    drop(outcome_tx);

    let medium = tokio::spawn(medium.run(cancel.clone()));

    let offered = addresses.len() * args.count;
    let (mut acknowledged, mut dropped) = (0, 0);
    let limit = tokio::time::sleep(std::time::Duration::from_millis(args.time_limit_ms) * 1000);
    tokio::pin!(limit);

    while acknowledged + dropped < offered {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut limit => {
                warn!("time limit reached with {} of {} PDUs resolved", acknowledged + dropped, offered);
                break;
            }
            outcome = outcomes.recv() => match outcome {
                Some(Outcome::Acknowledged) => acknowledged += 1,
                Some(Outcome::Dropped) => dropped += 1,
                None => break,
            },
        }
    }
    let elapsed = clock.now().since_epoch();
    cancel.cancel();

    let mut reports = Vec::new();
    for handle in stations {
        reports.push(handle.await.context("station task panicked")??);
    }
    let medium = medium.await.context("medium task panicked")??;

    Ok(Summary {
        stations: reports,
        medium,
        elapsed,
        offered,
        acknowledged,
        dropped,
    })
}

#[tokio::main(flavor = "current_thread", start_paused = true)]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    info!(
        "{} stations, {} PDUs each, loss {}, seed {}",
        args.stations, args.count, args.loss, args.seed
    );

    let summary = simulate(&args).await?;
    summary.log();

    ensure!(
        summary.out_of_order() == 0,
        "{} deliveries out of order",
        summary.out_of_order()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(["linksim"].iter().chain(extra))
    }

    #[tokio::test(start_paused = true)]
    async fn test_lossless_run_delivers_everything() {
        let args = args(&["--stations", "3", "--count", "40", "--loss", "0"]);
        let summary = simulate(&args).await.unwrap();

        assert!(summary.completed());
        assert_eq!(summary.acknowledged, 120);
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.delivered(), 120);
        assert_eq!(summary.out_of_order(), 0);
        assert_eq!(summary.medium.corrupted, 0);
        assert!(summary.stations.iter().all(|s| s.stats.retransmissions == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lossy_run_recovers() {
        let args = args(&[
            "--stations",
            "2",
            "--count",
            "50",
            "--loss",
            "0.1",
            "--max-retransmissions",
            "100",
            "--seed",
            "42",
        ]);
        let summary = simulate(&args).await.unwrap();

        assert!(summary.completed());
        assert_eq!(summary.dropped, 0);
        assert_eq!(summary.delivered(), 100);
        assert_eq!(summary.out_of_order(), 0);
        assert!(summary.medium.corrupted > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_station_is_refused() {
        let args = args(&["--stations", "1"]);
        assert!(simulate(&args).await.is_err());
    }
}
