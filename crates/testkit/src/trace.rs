//! Tick trace harness for deterministic, tick-based state tests.
//!
//! A trace steps a small simulation for a fixed number of ticks and records a
//! snapshot per tick. Two traces of the same scenario must digest equally.

use crate::snapshot::digest;
use anyhow::Result;
use fpsim_core::SimTick;
use serde::Serialize;

/// Single snapshot frame captured at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceFrame<S> {
    /// Tick number.
    pub tick: u64,
    /// Snapshot payload.
    pub snapshot: S,
}

/// Recorded frames of one scenario run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace<S> {
    /// Scenario name.
    pub name: String,
    /// Frames, starting with the initial state at `start`.
    pub frames: Vec<TraceFrame<S>>,
}

impl<S: Serialize> Trace<S> {
    /// Digest of the whole trace.
    pub fn digest(&self) -> Result<String> {
        digest(self)
    }

    /// Snapshot recorded for `tick`.
    pub fn at(&self, tick: u64) -> Option<&S> {
        self.frames
            .iter()
            .find(|frame| frame.tick == tick)
            .map(|frame| &frame.snapshot)
    }

    /// Last recorded snapshot.
    pub fn last(&self) -> Option<&S> {
        self.frames.last().map(|frame| &frame.snapshot)
    }
}

/// Run `ticks` steps starting at `start`.
///
/// Captures the initial snapshot, then steps and captures after each step,
/// so the trace contains `ticks + 1` frames. Frame `n` holds the state after
/// tick `n` was simulated.
pub fn run_trace<State, Snapshot, StepFn, SnapFn>(
    name: &str,
    start: SimTick,
    ticks: u64,
    mut state: State,
    mut step: StepFn,
    mut snapshot: SnapFn,
) -> Trace<Snapshot>
where
    StepFn: FnMut(SimTick, &mut State),
    SnapFn: FnMut(SimTick, &State) -> Snapshot,
{
    let mut frames = Vec::with_capacity(ticks as usize + 1);
    frames.push(TraceFrame {
        tick: start.0,
        snapshot: snapshot(start, &state),
    });

    let mut tick = start;
    for _ in 0..ticks {
        tick = tick.advance(1);
        step(tick, &mut state);
        frames.push(TraceFrame {
            tick: tick.0,
            snapshot: snapshot(tick, &state),
        });
    }

    Trace {
        name: name.to_string(),
        frames,
    }
}
