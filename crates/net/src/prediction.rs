//! Client-side prediction with rollback and replay.
//!
//! The owning client steps its character immediately with each committed
//! input and keeps `(tick, input, predicted snapshot)` for every tick the
//! authority has not yet confirmed. An authoritative snapshot for tick `T`
//! drops everything at or before `T`, overwrites the local state, and replays
//! the remaining ticks in order. Replay discards step effects: shots, reloads
//! and lock commands already went out on the first execution.

use crate::protocol::ReconciliationSnapshot;
use fpsim_core::{ReconcileConfig, SimTick};
use fpsim_input::TickInput;
use fpsim_sim::{step, CharacterSnapshot, CharacterState, StepContext};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// One locally predicted tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedTick {
    /// Tick simulated.
    pub tick: SimTick,
    /// Input committed for it.
    pub input: TickInput,
    /// Reconciled fields after the step.
    pub state: CharacterSnapshot,
}

/// Metrics for tracking prediction accuracy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionMetrics {
    /// Ticks predicted locally.
    pub total_predictions: u64,
    /// Snapshots applied.
    pub snapshots_applied: u64,
    /// Snapshots whose position differed from the prediction by more than epsilon.
    pub corrections: u64,
    /// Snapshots ignored because a newer one was already applied.
    pub stale_ignored: u64,
    /// Ticks re-simulated after corrections.
    pub replayed_ticks: u64,
    /// Running average of correction distance over `corrections`.
    pub avg_correction_distance: f32,
    /// Largest correction distance seen.
    pub max_correction_distance: f32,
}

impl PredictionMetrics {
    fn record_correction(&mut self, distance: f32) {
        self.corrections += 1;
        self.avg_correction_distance = (self.avg_correction_distance
            * (self.corrections - 1) as f32
            + distance)
            / self.corrections as f32;
        if distance > self.max_correction_distance {
            self.max_correction_distance = distance;
        }
    }
}

/// Result of offering a snapshot to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconciliationResult {
    /// Snapshot tick was not newer than the last applied one.
    Stale {
        /// Tick of the ignored snapshot.
        tick: SimTick,
        /// Newest tick applied so far.
        last_applied: SimTick,
    },
    /// Snapshot was applied and pending ticks replayed.
    Applied {
        /// Tick of the applied snapshot.
        tick: SimTick,
        /// Ticks replayed on top of it.
        replayed: usize,
        /// Distance between the prediction for `tick` and the snapshot, when
        /// that tick was still buffered.
        correction: Option<f32>,
    },
}

/// Ring buffer of unconfirmed predictions plus the replay driver.
#[derive(Debug, Clone)]
pub struct Reconciler {
    history: VecDeque<PredictedTick>,
    capacity: usize,
    epsilon: f32,
    last_applied: Option<SimTick>,
    metrics: PredictionMetrics,
}

impl Reconciler {
    /// Create a reconciler sized by `config`.
    pub fn new(config: &ReconcileConfig) -> Self {
        let capacity = config.buffer_capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            epsilon: config.correction_epsilon,
            last_applied: None,
            metrics: PredictionMetrics::default(),
        }
    }

    /// Record the outcome of a first-execution step. The oldest entry is
    /// evicted once the buffer is full.
    pub fn record(&mut self, tick: SimTick, input: TickInput, predicted: CharacterSnapshot) {
        if self.history.back().is_some_and(|last| last.tick >= tick) {
            // Out-of-order record replaces the tail of the timeline.
            self.history.retain(|entry| entry.tick < tick);
        }
        self.history.push_back(PredictedTick {
            tick,
            input,
            state: predicted,
        });
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }
        self.metrics.total_predictions += 1;
    }

    /// Apply an authoritative snapshot to `state` and replay buffered ticks
    /// newer than it. `ctx.tick` is ignored; each replayed tick uses its own.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &ReconciliationSnapshot,
        state: &mut CharacterState,
        ctx: &StepContext<'_>,
    ) -> ReconciliationResult {
        if let Some(last_applied) = self.last_applied {
            if snapshot.tick <= last_applied {
                self.metrics.stale_ignored += 1;
                trace!(tick = %snapshot.tick, %last_applied, "stale snapshot ignored");
                return ReconciliationResult::Stale {
                    tick: snapshot.tick,
                    last_applied,
                };
            }
        }
        self.last_applied = Some(snapshot.tick);
        self.metrics.snapshots_applied += 1;

        let correction = self
            .history
            .iter()
            .find(|entry| entry.tick == snapshot.tick)
            .map(|entry| {
                entry
                    .state
                    .motion
                    .position
                    .distance(snapshot.state.motion.position)
            });

        self.history.retain(|entry| entry.tick > snapshot.tick);
        state.restore(&snapshot.state);

        for entry in self.history.iter_mut() {
            let replay_ctx = StepContext {
                tick: entry.tick,
                ..*ctx
            };
            *state = step(state, &entry.input, &replay_ctx).state;
            entry.state = state.snapshot(ctx.weapons);
        }
        let replayed = self.history.len();
        self.metrics.replayed_ticks += replayed as u64;

        if let Some(distance) = correction.filter(|d| *d > self.epsilon) {
            self.metrics.record_correction(distance);
            debug!(
                tick = %snapshot.tick,
                distance,
                replayed,
                "prediction corrected"
            );
        } else {
            trace!(tick = %snapshot.tick, replayed, "snapshot applied");
        }

        ReconciliationResult::Applied {
            tick: snapshot.tick,
            replayed,
            correction,
        }
    }

    /// Newest snapshot tick applied.
    pub fn last_applied(&self) -> Option<SimTick> {
        self.last_applied
    }

    /// Unconfirmed predictions, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PredictedTick> {
        self.history.iter()
    }

    /// Number of unconfirmed predictions.
    pub fn pending_count(&self) -> usize {
        self.history.len()
    }

    /// Get current prediction metrics.
    pub fn metrics(&self) -> &PredictionMetrics {
        &self.metrics
    }

    /// Forget all predictions and the last applied tick.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_applied = None;
        self.metrics = PredictionMetrics::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_core::SimConfig;
    use fpsim_physics::StaticWorld;
    use fpsim_sim::{spawn_character, Interactables, WeaponRegistry};
    use glam::{Vec2, Vec3};

    struct Fixture {
        config: SimConfig,
        world: StaticWorld,
        interactables: Interactables,
        weapons: WeaponRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let config = SimConfig::default();
            let weapons = WeaponRegistry::from_config(&config);
            Self {
                config,
                world: StaticWorld::with_ground(0.0),
                interactables: Interactables::new(),
                weapons,
            }
        }

        fn ctx(&self, tick: SimTick) -> StepContext<'_> {
            StepContext {
                config: &self.config,
                world: &self.world,
                interactables: &self.interactables,
                weapons: &self.weapons,
                tick,
            }
        }
    }

    fn forward() -> TickInput {
        TickInput {
            movement: Vec2::new(0.0, 1.0),
            ..TickInput::default()
        }
    }

    #[test]
    fn capacity_evicts_oldest() {
        let fixture = Fixture::new();
        let state = spawn_character(1, Vec3::ZERO, &fixture.config, &fixture.weapons);
        let mut reconciler = Reconciler::new(&ReconcileConfig {
            buffer_capacity: 3,
            ..ReconcileConfig::default()
        });
        for t in 1..=5 {
            reconciler.record(SimTick(t), forward(), state.snapshot(&fixture.weapons));
        }
        let ticks: Vec<u64> = reconciler.pending().map(|p| p.tick.0).collect();
        assert_eq!(ticks, vec![3, 4, 5]);
        assert_eq!(reconciler.metrics().total_predictions, 5);
    }

    #[test]
    fn stale_snapshot_is_ignored() {
        let fixture = Fixture::new();
        let mut state = spawn_character(1, Vec3::ZERO, &fixture.config, &fixture.weapons);
        let mut reconciler = Reconciler::new(&ReconcileConfig::default());
        let snap = |tick: u64, x: f32| {
            let mut s = state.snapshot(&fixture.weapons);
            s.motion.position.x = x;
            ReconciliationSnapshot {
                tick: SimTick(tick),
                entity: 1,
                state: s,
            }
        };
        let newer = snap(6, 1.0);
        let older = snap(4, 9.0);
        let ctx = fixture.ctx(SimTick(6));
        assert!(matches!(
            reconciler.apply_snapshot(&newer, &mut state, &ctx),
            ReconciliationResult::Applied { .. }
        ));
        assert_eq!(
            reconciler.apply_snapshot(&older, &mut state, &ctx),
            ReconciliationResult::Stale {
                tick: SimTick(4),
                last_applied: SimTick(6)
            }
        );
        assert_eq!(state.motion.position.x, 1.0);
        assert_eq!(reconciler.metrics().stale_ignored, 1);
    }

    #[test]
    fn snapshot_prunes_and_replays_newer_ticks() {
        let fixture = Fixture::new();
        let mut state = spawn_character(1, Vec3::ZERO, &fixture.config, &fixture.weapons);
        let mut reconciler = Reconciler::new(&ReconcileConfig::default());
        let mut authoritative = None;
        for t in 1..=6 {
            let tick = SimTick(t);
            state = step(&state, &forward(), &fixture.ctx(tick)).state;
            reconciler.record(tick, forward(), state.snapshot(&fixture.weapons));
            if t == 3 {
                authoritative = Some(state.snapshot(&fixture.weapons));
            }
        }
        let predicted_end = state.clone();

        let mut shifted = authoritative.expect("tick 3 recorded");
        shifted.motion.position.x += 0.5;
        let snapshot = ReconciliationSnapshot {
            tick: SimTick(3),
            entity: 1,
            state: shifted,
        };
        let result = reconciler.apply_snapshot(&snapshot, &mut state, &fixture.ctx(SimTick(6)));
        match result {
            ReconciliationResult::Applied {
                replayed,
                correction,
                ..
            } => {
                assert_eq!(replayed, 3);
                let distance = correction.expect("tick 3 buffered");
                assert!((distance - 0.5).abs() < 1e-4);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reconciler.pending_count(), 3);
        assert!((state.motion.position.x - predicted_end.motion.position.x - 0.5).abs() < 1e-4);
        assert!((state.motion.position.z - predicted_end.motion.position.z).abs() < 1e-5);
        assert_eq!(reconciler.metrics().corrections, 1);
        assert_eq!(reconciler.metrics().replayed_ticks, 3);
    }

    #[test]
    fn matching_snapshot_is_not_a_correction() {
        let fixture = Fixture::new();
        let mut state = spawn_character(1, Vec3::ZERO, &fixture.config, &fixture.weapons);
        let mut reconciler = Reconciler::new(&ReconcileConfig::default());
        for t in 1..=4 {
            let tick = SimTick(t);
            state = step(&state, &forward(), &fixture.ctx(tick)).state;
            reconciler.record(tick, forward(), state.snapshot(&fixture.weapons));
        }
        let before = state.clone();
        let snapshot = ReconciliationSnapshot {
            tick: SimTick(2),
            entity: 1,
            state: reconciler
                .pending()
                .nth(1)
                .map(|p| p.state.clone())
                .expect("tick 2 buffered"),
        };
        reconciler.apply_snapshot(&snapshot, &mut state, &fixture.ctx(SimTick(4)));
        assert_eq!(state, before);
        assert_eq!(reconciler.metrics().corrections, 0);
    }
}
