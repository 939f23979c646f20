//! The character step: one fixed tick of facing, interaction, ground, move
//! mode, movement, jump, weapons and integration, in that order.

use crate::events::{InteractionCommand, SimEvent, StepEffects};
use crate::interaction::Interactables;
use crate::motion;
use crate::state::CharacterState;
use crate::weapon::{WeaponFrame, WeaponRegistry};
use fpsim_core::{SimConfig, SimTick};
use fpsim_input::{Button, ButtonSet, TickInput};
use fpsim_physics::{CollisionWorld, Ray};

/// Read-only collaborators of a step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    /// Tuning shared by every peer.
    pub config: &'a SimConfig,
    /// Collision geometry.
    pub world: &'a dyn CollisionWorld,
    /// Interactable lock state as of the start of the tick.
    pub interactables: &'a Interactables,
    /// Weapon variants.
    pub weapons: &'a WeaponRegistry,
    /// Tick being simulated.
    pub tick: SimTick,
}

/// Result of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// State after the tick.
    pub state: CharacterState,
    /// Effects to forward on first execution only.
    pub effects: StepEffects,
}

/// Advance `state` by one tick.
///
/// Pure: the same state, input and context always produce the same outcome.
/// Dead characters are returned unchanged.
pub fn step(state: &CharacterState, input: &TickInput, ctx: &StepContext<'_>) -> StepOutcome {
    let mut next = state.clone();
    let mut effects = StepEffects::default();
    if !next.is_alive() {
        return StepOutcome {
            state: next,
            effects,
        };
    }

    let config = &ctx.config.motion;
    let dt = ctx.config.tick_delta();
    let input = input.sanitized();

    motion::integrate_facing(&mut next.motion, input.look_delta);
    let input = resolve_interaction(&mut next, &input, ctx, &mut effects);
    motion::check_ground(&mut next.motion, ctx.world, config, dt, ctx.tick, next.entity);
    motion::resolve_move_mode(&mut next.motion, &input, next.interacting.is_some(), config);
    motion::apply_movement(&mut next.motion, &input, config, dt);
    motion::apply_jump(&mut next.motion, &input, config, ctx.tick);
    switch_weapons(&mut next, &input, &mut effects);
    step_weapons(&mut next, &input, ctx, dt, &mut effects);
    motion::clip_walls(&mut next.motion, ctx.world, config, dt, next.entity);
    motion::integrate(&mut next.motion, config, dt);

    StepOutcome {
        state: next,
        effects,
    }
}

/// Seek, start, keep or end an interaction. Returns the input the rest of
/// the step should see.
fn resolve_interaction(
    next: &mut CharacterState,
    input: &TickInput,
    ctx: &StepContext<'_>,
    effects: &mut StepEffects,
) -> TickInput {
    let entity = next.entity;

    let Some(target) = next.interacting else {
        let eye = next.motion.eye(ctx.config.motion.eye_height);
        let hit = Ray::new(eye, next.motion.view_forward()).and_then(|ray| {
            ctx.world
                .raycast(&ray, ctx.config.motion.interaction_distance, Some(entity))
        });
        next.looking_at = hit
            .and_then(|hit| hit.owner)
            .filter(|id| ctx.interactables.get(*id).is_some());

        if let Some(target) = next.looking_at {
            let eligible = ctx
                .interactables
                .get(target)
                .is_some_and(|i| i.can_interact(next, ctx.weapons));
            if eligible && input.pressed(Button::Interact) {
                next.interacting = Some(target);
                effects.commands.push(InteractionCommand::Start {
                    interactor: entity,
                    target,
                });
                effects
                    .events
                    .push(SimEvent::InteractionStarted { entity, target });
            }
        }
        return *input;
    };

    match ctx.interactables.get(target) {
        // Target vanished: drop the reference without ceremony.
        None => {
            next.interacting = None;
            next.looking_at = None;
        }
        Some(interactable) => {
            let owns_lock = interactable.interactor() == Some(entity);
            let keep = input.held(Button::Interact)
                && owns_lock
                && interactable.can_interact(next, ctx.weapons);
            if !keep {
                next.interacting = None;
                if owns_lock {
                    effects.commands.push(InteractionCommand::Stop {
                        interactor: entity,
                        target,
                    });
                    effects
                        .events
                        .push(SimEvent::InteractionStopped { entity, target });
                }
            }
        }
    }
    input.neutralized(ButtonSet::INTERACT)
}

fn switch_weapons(next: &mut CharacterState, input: &TickInput, effects: &mut StepEffects) {
    for (button, slot) in [(Button::Weapon1, 0), (Button::Weapon2, 1)] {
        if input.pressed(button)
            && slot < next.weapons.len()
            && next.motion.active_slot != Some(slot)
        {
            next.motion.active_slot = Some(slot);
            effects.events.push(SimEvent::WeaponSwitched {
                entity: next.entity,
                slot,
            });
        }
    }
}

fn step_weapons(
    next: &mut CharacterState,
    input: &TickInput,
    ctx: &StepContext<'_>,
    dt: f32,
    effects: &mut StepEffects,
) {
    let active = next.motion.active_slot;
    for (slot, weapon) in next.weapons.iter_mut().enumerate() {
        let Some(behavior) = ctx.weapons.get(&weapon.kind) else {
            continue;
        };
        if active == Some(slot) {
            let mut frame = WeaponFrame {
                entity: next.entity,
                slot,
                input,
                motion: &mut next.motion,
                eye_height: ctx.config.motion.eye_height,
                tick: ctx.tick,
                tick_rate: ctx.config.tick_rate,
                dt,
                events: &mut effects.events,
            };
            behavior.on_tick_step(&mut weapon.state, &mut frame);
        } else {
            behavior.on_inactive_tick(&mut weapon.state, ctx.tick);
        }
    }
}
