//! Ready-made worlds and scripted inputs for simulation tests.

use fpsim_core::{EntityId, SimConfig, SimTick};
use fpsim_input::{ButtonSet, InputSampler, RawFrame, TickInput};
use fpsim_physics::{Aabb, StaticWorld};
use fpsim_sim::{
    spawn_character, step, CharacterState, Interactable, Interactables, SimEvent, StepContext,
    WeaponRegistry,
};
use glam::{Vec2, Vec3};

/// Builder for a per-tick input sequence, committed through the real sampler.
#[derive(Debug, Clone, Default)]
pub struct InputScript {
    frames: Vec<RawFrame>,
}

impl InputScript {
    /// Empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one tick with explicit values.
    pub fn tick(mut self, movement: Vec2, look: Vec2, buttons: ButtonSet) -> Self {
        self.frames.push(RawFrame {
            movement,
            look,
            buttons,
        });
        self
    }

    /// Append `ticks` ticks holding `buttons` with `movement`.
    pub fn hold(mut self, buttons: ButtonSet, movement: Vec2, ticks: usize) -> Self {
        let frame = RawFrame {
            movement,
            look: Vec2::ZERO,
            buttons,
        };
        self.frames.extend(std::iter::repeat(frame).take(ticks));
        self
    }

    /// Append `ticks` idle ticks.
    pub fn idle(self, ticks: usize) -> Self {
        self.hold(ButtonSet::empty(), Vec2::ZERO, ticks)
    }

    /// Number of scripted ticks.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True if nothing is scripted.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Commit every scripted tick, one frame per tick.
    pub fn commit(&self) -> Vec<TickInput> {
        let mut sampler = InputSampler::new(1.0);
        self.frames
            .iter()
            .map(|frame| {
                sampler.sample_frame(frame);
                sampler.commit()
            })
            .collect()
    }
}

/// Self-contained authoritative world for tests: config, geometry,
/// interactables and weapons.
#[derive(Debug)]
pub struct Arena {
    /// Tuning.
    pub config: SimConfig,
    /// Geometry.
    pub world: StaticWorld,
    /// Interactables.
    pub interactables: Interactables,
    /// Weapon variants.
    pub weapons: WeaponRegistry,
}

impl Default for Arena {
    fn default() -> Self {
        Self::flat(SimConfig::default())
    }
}

impl Arena {
    /// Ground plane at height zero.
    pub fn flat(config: SimConfig) -> Self {
        let weapons = WeaponRegistry::from_config(&config);
        Self {
            config,
            world: StaticWorld::with_ground(0.0),
            interactables: Interactables::new(),
            weapons,
        }
    }

    /// Flat arena enclosed by four walls `half_extent` from the origin.
    pub fn walled(config: SimConfig, half_extent: f32) -> Self {
        let mut arena = Self::flat(config);
        let h = half_extent;
        for (min, max) in [
            (Vec3::new(-h - 1.0, 0.0, -h - 1.0), Vec3::new(h + 1.0, 3.0, -h)),
            (Vec3::new(-h - 1.0, 0.0, h), Vec3::new(h + 1.0, 3.0, h + 1.0)),
            (Vec3::new(-h - 1.0, 0.0, -h), Vec3::new(-h, 3.0, h)),
            (Vec3::new(h, 0.0, -h), Vec3::new(h + 1.0, 3.0, h)),
        ] {
            arena.world.add_box(Aabb::new(min, max), None);
        }
        arena
    }

    /// Place an interactable with a unit box collider centred at `center`.
    pub fn add_interactable(&mut self, id: EntityId, center: Vec3, interactable: Interactable) {
        self.world
            .add_box(Aabb::from_center_size(center, Vec3::ONE), Some(id));
        self.interactables.insert(id, interactable);
    }

    /// Step context for `tick`.
    pub fn ctx(&self, tick: SimTick) -> StepContext<'_> {
        StepContext {
            config: &self.config,
            world: &self.world,
            interactables: &self.interactables,
            weapons: &self.weapons,
            tick,
        }
    }

    /// Character standing at `position` with the configured loadout.
    pub fn spawn(&self, entity: EntityId, position: Vec3) -> CharacterState {
        spawn_character(entity, position, &self.config, &self.weapons)
    }

    /// Run one authoritative tick: step, apply lock commands, advance
    /// interactables and grant completions. Returns every event produced.
    pub fn tick(
        &mut self,
        state: &mut CharacterState,
        input: &TickInput,
        tick: SimTick,
    ) -> Vec<SimEvent> {
        self.tick_many(
            std::slice::from_mut(state),
            std::slice::from_ref(input),
            tick,
        )
    }

    /// [`Arena::tick`] for several characters sharing the arena. Every
    /// character steps against the start-of-tick locks; `inputs` pairs with
    /// `states` by index and missing inputs are idle.
    pub fn tick_many(
        &mut self,
        states: &mut [CharacterState],
        inputs: &[TickInput],
        tick: SimTick,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let mut commands = Vec::new();
        for (i, state) in states.iter_mut().enumerate() {
            let input = inputs.get(i).copied().unwrap_or_default();
            let outcome = step(state, &input, &self.ctx(tick));
            *state = outcome.state;
            events.extend(outcome.effects.events);
            commands.extend(outcome.effects.commands);
        }
        for command in &commands {
            self.interactables.apply(command);
        }
        for completion in self.interactables.advance(self.config.tick_delta()) {
            if let Some(state) = states
                .iter_mut()
                .find(|s| s.entity == completion.interactor)
            {
                self.interactables.grant(&completion, state, &self.weapons);
            }
            if self.interactables.get(completion.target).is_none() {
                self.world.remove_owned(completion.target);
            }
            events.push(completion.event());
        }
        events
    }

    /// Run `inputs` on consecutive ticks starting after `start`.
    pub fn run(
        &mut self,
        state: &mut CharacterState,
        inputs: &[TickInput],
        start: SimTick,
    ) -> Vec<(SimTick, SimEvent)> {
        let mut log = Vec::new();
        let mut tick = start;
        for input in inputs {
            tick = tick.advance(1);
            log.extend(self.tick(state, input, tick).into_iter().map(|e| (tick, e)));
        }
        log
    }
}
