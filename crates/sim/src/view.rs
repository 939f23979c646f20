//! Read-only presentation snapshot of a character.

use crate::interaction::Interactables;
use crate::state::{CharacterState, MoveMode};
use crate::weapon::{WeaponRegistry, WeaponView};
use fpsim_core::EntityId;
use glam::{Vec2, Vec3};

/// Interaction shown to the player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionView {
    /// Interactable.
    pub target: EntityId,
    /// Completion fraction in `[0, 1]`.
    pub progress: f32,
}

/// What rendering, audio and UI may read about a character.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterView {
    /// Character entity.
    pub entity: EntityId,
    /// Feet position.
    pub position: Vec3,
    /// Yaw and pitch in degrees.
    pub facing: Vec2,
    /// Standing on a surface.
    pub grounded: bool,
    /// Locomotion mode.
    pub move_mode: MoveMode,
    /// Hit points left.
    pub health: f32,
    /// Health bar fill in `[0, 1]`.
    pub health_fraction: f32,
    /// False once health reaches zero.
    pub alive: bool,
    /// Active weapon, if any.
    pub weapon: Option<WeaponView>,
    /// Interactable under the crosshair.
    pub looking_at: Option<EntityId>,
    /// Interaction in progress.
    pub interaction: Option<InteractionView>,
}

impl CharacterView {
    /// Derive the view from simulation state.
    pub fn new(
        state: &CharacterState,
        weapons: &WeaponRegistry,
        interactables: &Interactables,
    ) -> Self {
        let weapon = state.active_weapon().and_then(|equipped| {
            weapons
                .get(&equipped.kind)
                .map(|behavior| behavior.view(&equipped.state))
        });
        let interaction = state.interacting.and_then(|target| {
            interactables.get(target).map(|i| InteractionView {
                target,
                progress: i.progress(),
            })
        });
        Self {
            entity: state.entity,
            position: state.motion.position,
            facing: state.motion.facing,
            grounded: state.motion.grounded,
            move_mode: state.motion.move_mode,
            health: state.health.current(),
            health_fraction: state.health.fraction(),
            alive: state.is_alive(),
            weapon,
            looking_at: state.looking_at,
            interaction,
        }
    }

    /// Field of view blended toward the active weapon's aim FOV.
    pub fn field_of_view(&self, base: f32) -> f32 {
        match &self.weapon {
            Some(w) => base + (w.aim_field_of_view - base) * w.aim_fraction,
            None => base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_core::SimConfig;

    #[test]
    fn view_reflects_active_weapon() {
        let config = SimConfig::default();
        let weapons = WeaponRegistry::from_config(&config);
        let mut state = CharacterState::new(4, Vec3::ONE);
        state.weapons = weapons.equip(&config.loadout);
        state.motion.active_slot = Some(1);
        state.weapons[1].state.aim_percent = 0.5;

        let view = CharacterView::new(&state, &weapons, &Interactables::new());
        let weapon = view.weapon.as_ref().expect("active weapon");
        assert_eq!(weapon.name, "pistol");
        assert_eq!(weapon.ammo_text, "12/36");
        assert_eq!(view.field_of_view(100.0), 85.0);
        assert!(view.interaction.is_none());
        assert!(view.alive);
        assert_eq!(view.health_fraction, 1.0);
    }
}
