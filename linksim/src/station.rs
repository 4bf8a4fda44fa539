//! One simulated station: a link controller driven by medium events.

use std::collections::{BTreeMap, VecDeque};

use anyhow::Context;
use blockack::model::frame;
use blockack::{
    Address, DefaultManager, Duration, Instant, LinkConfig, LinkController, LinkEvent,
    LinkStats, LossCounters, Pdu,
};
use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::medium::Clock;

/// Message from the medium to a station.
#[derive(Debug)]
pub enum StationEvent {
    /// The medium is free for this station; answer with the frame to send.
    Opportunity {
        grant: oneshot::Sender<Option<(Pdu, Vec<u8>)>>,

        /// Only an owed Ack-Reply may be sent.
        reply_only: bool,
    },

    RxStart { airtime: Duration },

    /// Received bytes, possibly corrupted on the way.
    RxEnd { frame: Vec<u8> },

    TxEnd,
}

/// Fate of an offered PDU, reported to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acknowledged,
    Dropped,
}

/// What a station saw during the run.
#[derive(Debug, Clone)]
pub struct StationReport {
    pub address: Address,
    pub stats: LinkStats,
    pub losses: LossCounters,
    pub delivered: u64,
    pub delivered_bytes: u64,

    /// Deliveries that went backwards within a source's stream.
    pub out_of_order: u64,

    /// PDUs never admitted before shutdown.
    pub backlog: usize,
}

pub struct Station {
    controller: LinkController<DefaultManager, LossCounters>,
    inbox: mpsc::Receiver<StationEvent>,
    outcomes: mpsc::UnboundedSender<Outcome>,
    clock: Clock,
    backlog: VecDeque<Pdu>,
    lifetime: Option<Duration>,
    in_air: Option<Pdu>,
    last_seen: BTreeMap<Address, u64>,
    delivered: u64,
    delivered_bytes: u64,
    out_of_order: u64,
}

impl Station {
    pub fn new(
        address: Address,
        config: LinkConfig,
        inbox: mpsc::Receiver<StationEvent>,
        outcomes: mpsc::UnboundedSender<Outcome>,
        clock: Clock,
    ) -> anyhow::Result<Self> {
        let manager = DefaultManager::new(config.max_retransmissions);
        let controller = LinkController::with_parts(address, config, manager, LossCounters::new())
            .with_context(|| format!("invalid configuration for {}", address))?;

        Ok(Self {
            controller,
            inbox,
            outcomes,
            clock,
            backlog: VecDeque::new(),
            lifetime: None,
            in_air: None,
            last_seen: BTreeMap::new(),
            delivered: 0,
            delivered_bytes: 0,
            out_of_order: 0,
        })
    }

    /// Drop PDUs still unacknowledged `lifetime` after they were admitted.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Queues application traffic; it is admitted as capacity frees up.
    pub fn offer(&mut self, pdus: impl IntoIterator<Item = Pdu>) {
        self.backlog.extend(pdus);
    }

    pub fn address(&self) -> Address {
        self.controller.address()
    }

    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<StationReport> {
        debug!("{}: {} PDUs offered", self.address(), self.backlog.len());

        loop {
            let now = self.clock.now();
            self.controller.handle_timeout(now);
            self.drain_events();
            self.admit(now);

            // reply instants are served by the medium, only future deadlines matter
            let deadline = self
                .controller
                .poll_timeout()
                .filter(|at| *at > now)
                .map(|at| self.clock.deadline(at));

            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.inbox.recv() => match event {
                    Some(event) => self.handle(event)?,
                    None => break,
                },
                _ = sleep_until(deadline) => {}
            }
        }

        Ok(self.report())
    }

    fn handle(&mut self, event: StationEvent) -> anyhow::Result<()> {
        let now = self.clock.now();

        match event {
            StationEvent::Opportunity { grant, reply_only } => {
                let polled = if reply_only && !self.controller.owes_reply() {
                    None
                } else {
                    self.controller.poll_transmit(now)
                };
                let frame = match polled {
                    Some(pdu) => {
                        let bytes = frame::encode(&pdu)?;
                        self.controller.on_tx_start(&pdu, now);
                        self.in_air = Some(pdu.clone());
                        Some((pdu, bytes))
                    }
                    None => None,
                };
                // the medium only hangs up on shutdown
                let _ = grant.send(frame);
            }
            StationEvent::RxStart { airtime } => self.controller.on_rx_start(airtime, now),
            StationEvent::RxEnd { frame } => match frame::decode(&frame) {
                Ok(pdu) => {
                    self.controller.on_rx_end(now);
                    self.controller
                        .handle_incoming(pdu, now)
                        .with_context(|| format!("{} at {}", self.address(), now))?;
                }
                Err(e) => {
                    trace!("{}: undecodable frame: {}", self.address(), e);
                    self.controller.on_rx_error(now);
                }
            },
            StationEvent::TxEnd => {
                if let Some(pdu) = self.in_air.take() {
                    self.controller.on_tx_end(&pdu, now);
                }
            }
        }
        Ok(())
    }

    fn admit(&mut self, now: Instant) {
        while let Some(pdu) = self.backlog.pop_front() {
            let own = pdu.deadline();
            let pdu = match (self.lifetime, own) {
                (Some(lifetime), None) => pdu.with_deadline(now + lifetime),
                _ => pdu,
            };
            if let Err(rejected) = self.controller.enqueue(pdu) {
                // lifetime runs from admission
                let mut pdu = rejected.pdu;
                pdu.set_deadline(own);
                self.backlog.push_front(pdu);
                break;
            }
        }
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.controller.poll_event() {
            match event {
                LinkEvent::Delivered(pdu) => self.delivered(pdu),
                LinkEvent::Acknowledged { .. } => {
                    let _ = self.outcomes.send(Outcome::Acknowledged);
                }
                LinkEvent::Dropped(pdu) => {
                    warn!(
                        "{}: gave up on {} for {} after {} attempts",
                        self.address(),
                        pdu.sn().unwrap_or_default(),
                        pdu.destination(),
                        pdu.attempt() - 1
                    );
                    let _ = self.outcomes.send(Outcome::Dropped);
                }
            }
        }
    }

    fn delivered(&mut self, pdu: Pdu) {
        self.delivered += 1;
        self.delivered_bytes += pdu.payload().len() as u64;

        let Some(counter) = stream_counter(pdu.payload()) else {
            return;
        };
        let source = pdu.source();
        if let Some(last) = self.last_seen.insert(source, counter) {
            if counter <= last {
                warn!(
                    "{}: {} from {} delivered after {}",
                    self.address(),
                    counter,
                    source,
                    last
                );
                self.out_of_order += 1;
            }
        }
    }

    fn report(&self) -> StationReport {
        StationReport {
            address: self.address(),
            stats: *self.controller.stats(),
            losses: *self.controller.tracker(),
            delivered: self.delivered,
            delivered_bytes: self.delivered_bytes,
            out_of_order: self.out_of_order,
            backlog: self.backlog.len(),
        }
    }
}

/// Builds `count` PDUs from `source`, each payload opening with the
/// per-destination stream counter.
pub fn traffic(
    source: Address,
    destinations: impl IntoIterator<Item = Address>,
    payload_len: usize,
) -> Vec<Pdu> {
    let mut counters: BTreeMap<Address, u64> = BTreeMap::new();

    destinations
        .into_iter()
        .map(|destination| {
            let counter = counters.entry(destination).or_default();
            let mut payload = counter.to_be_bytes().to_vec();
            payload.resize(payload_len.max(8), 0xA5);
            *counter += 1;
            Pdu::data(source, destination, payload)
        })
        .collect()
}

fn stream_counter(payload: &[u8]) -> Option<u64> {
    let raw: [u8; 8] = payload.get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
