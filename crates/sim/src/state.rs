//! Per-entity simulation state carried across ticks.

use crate::health::Health;
use crate::weapon::WeaponRegistry;
use fpsim_core::{EntityId, Inventory, SimTick};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Discrete locomotion state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MoveMode {
    /// Default speed.
    #[default]
    Walk,
    /// Fast forward movement.
    Sprint,
    /// Slow grounded movement.
    Crouch,
}

/// Kinematic state mutated only by the motion step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionState {
    /// Feet position.
    pub position: Vec3,
    /// Linear velocity.
    pub velocity: Vec3,
    /// Facing in degrees: x is yaw in `[0, 360)`, y is pitch in `[-90, 90]`.
    pub facing: Vec2,
    /// Standing on a surface.
    pub grounded: bool,
    /// Tick of the last jump impulse.
    pub last_jump_tick: Option<SimTick>,
    /// Locomotion mode.
    pub move_mode: MoveMode,
    /// Index of the active weapon slot.
    pub active_slot: Option<usize>,
}

impl MotionState {
    /// Resting state at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Horizontal forward direction for the current yaw.
    pub fn forward(&self) -> Vec3 {
        let (sin, cos) = self.facing.x.to_radians().sin_cos();
        Vec3::new(sin, 0.0, cos)
    }

    /// Horizontal right direction for the current yaw.
    pub fn right(&self) -> Vec3 {
        let (sin, cos) = self.facing.x.to_radians().sin_cos();
        Vec3::new(cos, 0.0, -sin)
    }

    /// View direction including pitch.
    pub fn view_forward(&self) -> Vec3 {
        let (sin_p, cos_p) = self.facing.y.to_radians().sin_cos();
        self.forward() * cos_p + Vec3::Y * sin_p
    }

    /// View origin for an eye at `eye_height` above the feet.
    pub fn eye(&self, eye_height: f32) -> Vec3 {
        self.position + Vec3::Y * eye_height
    }
}

/// Reconciled per-weapon data.
///
/// `magazine` stays within `[0, magazine_size]` and `reloading` is true
/// exactly while `reload_timer > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WeaponState {
    /// Seconds until the next shot is allowed (fires at `<= 0`).
    pub shot_timer: f32,
    /// Rounds in the magazine.
    pub magazine: u32,
    /// Rounds in reserve; `None` means unlimited.
    pub reserve: Option<u32>,
    /// Reload in progress.
    pub reloading: bool,
    /// Seconds left in the reload.
    pub reload_timer: f32,
    /// Angular recoil velocity (deg/s) applied to facing.
    pub recoil_velocity: Vec2,
    /// Last tick the weapon was inactive; drives the equip delay.
    pub last_disabled_tick: SimTick,
    /// Aim blend in `[0, 1]`.
    pub aim_percent: f32,
}

/// A weapon in one loadout slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquippedWeapon {
    /// Registry name of the weapon variant.
    pub kind: String,
    /// Reconciled data.
    pub state: WeaponState,
}

/// Everything the step reads and writes for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    /// Owning entity.
    pub entity: EntityId,
    /// Hit points; dead characters are frozen.
    pub health: Health,
    /// Kinematics.
    pub motion: MotionState,
    /// Loadout slots.
    pub weapons: Vec<EquippedWeapon>,
    /// Interactable currently locked by this character.
    pub interacting: Option<EntityId>,
    /// Interactable under the crosshair, re-derived every tick.
    pub looking_at: Option<EntityId>,
    /// Item pool fed by pickups.
    pub inventory: Inventory,
}

impl CharacterState {
    /// Living character at `position` with no weapons.
    pub fn new(entity: EntityId, position: Vec3) -> Self {
        Self {
            entity,
            health: Health::default(),
            motion: MotionState::at(position),
            weapons: Vec::new(),
            interacting: None,
            looking_at: None,
            inventory: Inventory::default(),
        }
    }

    /// True while health is above zero.
    pub fn is_alive(&self) -> bool {
        self.health.is_alive()
    }

    /// Active weapon slot, if it exists.
    pub fn active_weapon(&self) -> Option<&EquippedWeapon> {
        self.motion.active_slot.and_then(|slot| self.weapons.get(slot))
    }

    /// Mutable active weapon slot, if it exists.
    pub fn active_weapon_mut(&mut self) -> Option<&mut EquippedWeapon> {
        self.motion
            .active_slot
            .and_then(move |slot| self.weapons.get_mut(slot))
    }

    /// Reconciled subset of this state, with each weapon's data taken from
    /// its variant's post-tick hook.
    pub fn snapshot(&self, registry: &WeaponRegistry) -> CharacterSnapshot {
        let weapons = self
            .weapons
            .iter()
            .map(|w| match registry.get(&w.kind) {
                Some(behavior) => behavior.on_post_tick_snapshot(&w.state),
                None => w.state,
            })
            .collect();
        CharacterSnapshot {
            health: self.health,
            motion: self.motion,
            weapons,
            interacting: self.interacting,
            inventory: self.inventory.clone(),
        }
    }

    /// Overwrite the reconciled fields with `snapshot`.
    ///
    /// Weapon slots are matched by index; extra entries on either side are
    /// left untouched.
    pub fn restore(&mut self, snapshot: &CharacterSnapshot) {
        self.health = snapshot.health;
        self.motion = snapshot.motion;
        for (weapon, state) in self.weapons.iter_mut().zip(&snapshot.weapons) {
            weapon.state = *state;
        }
        self.interacting = snapshot.interacting;
        self.inventory = snapshot.inventory.clone();
    }
}

/// Minimal state needed to re-derive a character after a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    /// Hit points.
    pub health: Health,
    /// Kinematics, move mode and active slot.
    pub motion: MotionState,
    /// Weapon data in slot order.
    pub weapons: Vec<WeaponState>,
    /// Locked interactable.
    pub interacting: Option<EntityId>,
    /// Item pool.
    pub inventory: Inventory,
}
