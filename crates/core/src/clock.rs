//! Fixed-rate tick scheduling.
//!
//! The clock accumulates render-frame time and releases whole simulation ticks
//! at a constant rate. Consumers register through [`TickHooks`]; the clock calls
//! `on_tick` followed by `on_post_tick` for every tick that became due.

use crate::SimTick;

/// Upper bound on ticks released by a single frame (avoids a catch-up spiral).
const MAX_TICKS_PER_FRAME: u32 = 8;

/// Callbacks invoked by the [`TickClock`] for each simulated tick.
pub trait TickHooks {
    /// Advance the simulation by exactly one tick.
    fn on_tick(&mut self, tick: SimTick);
    /// Runs after every `on_tick`; used for snapshot emission.
    fn on_post_tick(&mut self, tick: SimTick);
}

/// Fixed-rate scheduler decoupled from the render frame rate.
#[derive(Debug, Clone)]
pub struct TickClock {
    tick_rate: u32,
    tick: SimTick,
    accumulator: f64,
}

impl TickClock {
    /// Create a clock running at `tick_rate` ticks per second, starting at tick zero.
    pub fn new(tick_rate: u32) -> Self {
        Self::starting_at(tick_rate, SimTick::ZERO)
    }

    /// Create a clock whose next tick will be `start`.
    pub fn starting_at(tick_rate: u32, start: SimTick) -> Self {
        Self {
            tick_rate: tick_rate.max(1),
            tick: start,
            accumulator: 0.0,
        }
    }

    /// Ticks per second.
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Fixed duration of one tick, in seconds.
    pub fn delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// The tick that will run next.
    pub fn current_tick(&self) -> SimTick {
        self.tick
    }

    /// Convert a tick index to elapsed simulated seconds.
    pub fn ticks_to_seconds(&self, tick: SimTick) -> f64 {
        tick.0 as f64 / self.tick_rate as f64
    }

    /// Convert a duration in seconds to a whole number of ticks (rounded up).
    pub fn seconds_to_ticks(&self, seconds: f32) -> u64 {
        let exact = seconds.max(0.0) as f64 * self.tick_rate as f64;
        // f32 inputs like 0.1 land a hair above the whole tick count.
        (exact - 1e-4).ceil().max(0.0) as u64
    }

    /// Feed a render-frame duration and run every tick that became due.
    ///
    /// Returns the number of ticks executed.
    pub fn run_frame<H: TickHooks + ?Sized>(&mut self, frame_seconds: f64, hooks: &mut H) -> u32 {
        let step = 1.0 / self.tick_rate as f64;
        self.accumulator += frame_seconds.max(0.0);

        let mut ran = 0;
        while self.accumulator >= step && ran < MAX_TICKS_PER_FRAME {
            self.accumulator -= step;
            self.step_once(hooks);
            ran += 1;
        }

        if ran == MAX_TICKS_PER_FRAME && self.accumulator >= step {
            tracing::warn!(
                dropped = self.accumulator / step,
                "tick clock fell behind; dropping accumulated time"
            );
            self.accumulator = 0.0;
        }

        ran
    }

    /// Run exactly one tick regardless of accumulated time.
    pub fn step_once<H: TickHooks + ?Sized>(&mut self, hooks: &mut H) {
        let tick = self.tick;
        hooks.on_tick(tick);
        hooks.on_post_tick(tick);
        self.tick = tick.advance(1);
    }
}
