//! Datagram transport seam and an in-process lossy link for tests and the
//! headless demo.
//!
//! Delivery is unordered and lossy. Time is measured in ticks so a seeded link
//! reproduces the same drops and reorderings on every run.

use fpsim_core::SimTick;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One direction of an unreliable datagram channel.
pub trait Transport {
    /// Hand a frame to the link at `now`.
    fn send(&mut self, frame: Vec<u8>, now: SimTick);

    /// Frames due for delivery at or before `now`.
    fn receive(&mut self, now: SimTick) -> Vec<Vec<u8>>;
}

/// Impairments applied by a [`SimulatedLink`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConditions {
    /// Fixed one-way delay in ticks.
    pub latency_ticks: u64,
    /// Extra random delay in `0..=jitter_ticks`; nonzero jitter reorders frames.
    pub jitter_ticks: u64,
    /// Probability in `[0, 1]` that a frame is lost.
    pub drop_rate: f64,
    /// Seed for the drop/jitter generator.
    pub seed: u64,
}

impl LinkConditions {
    /// Zero-latency, lossless delivery.
    pub const PERFECT: Self = Self {
        latency_ticks: 0,
        jitter_ticks: 0,
        drop_rate: 0.0,
        seed: 0,
    };
}

impl Default for LinkConditions {
    fn default() -> Self {
        Self::PERFECT
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    deliver_at: SimTick,
    seq: u64,
    frame: Vec<u8>,
}

/// Delivery counters of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames handed to the link.
    pub sent: u64,
    /// Frames lost.
    pub dropped: u64,
    /// Frames delivered.
    pub delivered: u64,
}

/// Deterministic in-memory link with latency, jitter and loss.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    conditions: LinkConditions,
    rng: StdRng,
    in_flight: Vec<InFlight>,
    next_seq: u64,
    stats: LinkStats,
}

impl SimulatedLink {
    /// Create a link with the given impairments.
    pub fn new(conditions: LinkConditions) -> Self {
        Self {
            conditions,
            rng: StdRng::seed_from_u64(conditions.seed),
            in_flight: Vec::new(),
            next_seq: 0,
            stats: LinkStats::default(),
        }
    }

    /// Lossless, zero-latency link.
    pub fn perfect() -> Self {
        Self::new(LinkConditions::PERFECT)
    }

    /// Active impairments.
    pub fn conditions(&self) -> LinkConditions {
        self.conditions
    }

    /// Delivery counters.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Frames sent but not yet delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl Transport for SimulatedLink {
    fn send(&mut self, frame: Vec<u8>, now: SimTick) {
        self.stats.sent += 1;
        let drop_rate = self.conditions.drop_rate.clamp(0.0, 1.0);
        if drop_rate > 0.0 && self.rng.gen_bool(drop_rate) {
            self.stats.dropped += 1;
            trace!(%now, len = frame.len(), "frame dropped");
            return;
        }
        let jitter = if self.conditions.jitter_ticks > 0 {
            self.rng.gen_range(0..=self.conditions.jitter_ticks)
        } else {
            0
        };
        let deliver_at = now.advance(self.conditions.latency_ticks + jitter);
        self.in_flight.push(InFlight {
            deliver_at,
            seq: self.next_seq,
            frame,
        });
        self.next_seq += 1;
    }

    fn receive(&mut self, now: SimTick) -> Vec<Vec<u8>> {
        let (mut due, waiting): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|f| f.deliver_at <= now);
        self.in_flight = waiting;
        due.sort_by_key(|f| (f.deliver_at, f.seq));
        self.stats.delivered += due.len() as u64;
        due.into_iter().map(|f| f.frame).collect()
    }
}
