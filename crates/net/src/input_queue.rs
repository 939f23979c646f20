//! Authority-side buffer of inputs received for one entity.

use crate::protocol::InputBundle;
use fpsim_core::SimTick;
use fpsim_input::TickInput;
use std::collections::BTreeMap;
use tracing::trace;

/// Inputs that arrive more than this many ticks ahead are refused.
pub const MAX_INPUT_LEAD: u64 = 256;

/// Per-entity input buffer keyed by tick.
///
/// Redundant copies overwrite (last value wins). Inputs for ticks the
/// authority already simulated are dropped, and a tick with no input is
/// simulated with [`TickInput::default`].
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    pending: BTreeMap<SimTick, TickInput>,
    last_consumed: Option<SimTick>,
    stats: InputQueueStats,
}

/// Counters describing input delivery quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputQueueStats {
    /// Inputs accepted into the queue (including redundant copies).
    pub accepted: u64,
    /// Inputs dropped because their tick was already simulated.
    pub stale: u64,
    /// Inputs dropped because they were too far ahead.
    pub too_far_ahead: u64,
    /// Ticks simulated with a substituted default input.
    pub defaulted: u64,
}

impl InputQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one input. Returns whether it was kept.
    pub fn push(&mut self, tick: SimTick, input: TickInput) -> bool {
        if self.last_consumed.is_some_and(|last| tick <= last) {
            self.stats.stale += 1;
            return false;
        }
        let horizon = self.last_consumed.unwrap_or(SimTick::ZERO);
        if tick.since(horizon) > MAX_INPUT_LEAD {
            self.stats.too_far_ahead += 1;
            return false;
        }
        self.pending.insert(tick, input);
        self.stats.accepted += 1;
        true
    }

    /// Queue every input of a bundle, returning how many were kept.
    pub fn push_bundle(&mut self, bundle: &InputBundle) -> usize {
        bundle
            .inputs
            .iter()
            .filter(|ticked| self.push(ticked.tick, ticked.input))
            .count()
    }

    /// Input to simulate `tick` with. Discards everything at or before `tick`.
    pub fn take(&mut self, tick: SimTick) -> TickInput {
        let input = self.pending.remove(&tick);
        self.pending.retain(|t, _| *t > tick);
        self.last_consumed = Some(tick);
        match input {
            Some(input) => input,
            None => {
                self.stats.defaulted += 1;
                trace!(%tick, "no input, substituting default");
                TickInput::default()
            }
        }
    }

    /// Number of buffered future inputs.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no future input is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Last tick handed to the simulation.
    pub fn last_consumed(&self) -> Option<SimTick> {
        self.last_consumed
    }

    /// Delivery counters.
    pub fn stats(&self) -> InputQueueStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TickedInput;
    use fpsim_input::ButtonSet;
    use glam::Vec2;

    fn jump() -> TickInput {
        TickInput {
            held: ButtonSet::JUMP,
            ..TickInput::default()
        }
    }

    #[test]
    fn missing_tick_defaults() {
        let mut queue = InputQueue::new();
        assert_eq!(queue.take(SimTick(1)), TickInput::default());
        assert_eq!(queue.stats().defaulted, 1);
    }

    #[test]
    fn stale_input_dropped() {
        let mut queue = InputQueue::new();
        queue.take(SimTick(5));
        assert!(!queue.push(SimTick(5), jump()));
        assert!(!queue.push(SimTick(3), jump()));
        assert!(queue.push(SimTick(6), jump()));
        assert_eq!(queue.stats().stale, 2);
        assert_eq!(queue.take(SimTick(6)), jump());
    }

    #[test]
    fn last_value_wins() {
        let mut queue = InputQueue::new();
        let walk = TickInput {
            movement: Vec2::new(0.0, 1.0),
            ..TickInput::default()
        };
        queue.push(SimTick(2), jump());
        queue.push(SimTick(2), walk);
        assert_eq!(queue.take(SimTick(2)), walk);
    }

    #[test]
    fn redundant_bundles_fill_gaps() {
        let mut queue = InputQueue::new();
        let bundle = InputBundle {
            entity: 1,
            inputs: (1..=4)
                .map(|t| TickedInput {
                    tick: SimTick(t),
                    input: jump(),
                })
                .collect(),
        };
        assert_eq!(queue.push_bundle(&bundle), 4);
        assert_eq!(queue.take(SimTick(1)), jump());
        // Retransmission of already-consumed tick 1 is dropped.
        assert_eq!(queue.push_bundle(&bundle), 3);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn take_discards_skipped_ticks() {
        let mut queue = InputQueue::new();
        queue.push(SimTick(1), jump());
        queue.push(SimTick(2), jump());
        queue.push(SimTick(4), jump());
        assert_eq!(queue.take(SimTick(3)), TickInput::default());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn far_future_refused() {
        let mut queue = InputQueue::new();
        assert!(!queue.push(SimTick(MAX_INPUT_LEAD + 10), jump()));
        assert_eq!(queue.stats().too_far_ahead, 1);
    }
}
