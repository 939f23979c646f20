#![warn(missing_docs)]
//! Deterministic character simulation: motion, interaction, weapons and
//! the projectiles and health they act on.
//!
//! [`step`] is the single entry point. It is a pure function of the previous
//! state, one committed input and a read-only [`StepContext`], so the owning
//! client and the authority compute identical results and the client can
//! replay unacknowledged ticks after a correction.

pub mod events;
pub mod health;
pub mod interaction;
pub mod motion;
pub mod projectile;
pub mod state;
pub mod step;
pub mod view;
pub mod weapon;

pub use events::{InteractionCommand, SimEvent, StepEffects};
pub use health::Health;
pub use interaction::{Completion, Grant, Interactable, InteractableKind, Interactables, LockState};
pub use projectile::{Body, Projectile, ProjectileOutcome};
pub use state::{
    CharacterSnapshot, CharacterState, EquippedWeapon, MotionState, MoveMode, WeaponState,
};
pub use step::{step, StepContext, StepOutcome};
pub use view::{CharacterView, InteractionView};
pub use weapon::{Gun, WeaponBehavior, WeaponFrame, WeaponRegistry, WeaponView};

use fpsim_core::{EntityId, SimConfig};
use glam::Vec3;

/// Spawn a living character at full health with the configured loadout,
/// first slot active.
pub fn spawn_character(
    entity: EntityId,
    position: Vec3,
    config: &SimConfig,
    weapons: &WeaponRegistry,
) -> CharacterState {
    let mut state = CharacterState::new(entity, position);
    state.health = Health::new(config.combat.max_health);
    state.weapons = weapons.equip(&config.loadout);
    state.motion.active_slot = (!state.weapons.is_empty()).then_some(0);
    state
}
