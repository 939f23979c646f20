#![warn(missing_docs)]
//! Tick input commands and the owner-side input sampler.
//!
//! A [`TickInput`] is the committed command for one tick. Buttons carry both
//! the committed and the previously committed value so every peer derives the
//! same press/release edges from the same bytes.

mod bindings;
mod sampler;

pub use bindings::{Bindings, WinitInputSource};
pub use sampler::{InputSampler, RawFrame};

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Packed set of button states.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ButtonSet: u16 {
        /// Jump.
        const JUMP = 1 << 0;
        /// Crouch.
        const CROUCH = 1 << 1;
        /// Sprint.
        const SPRINT = 1 << 2;
        /// Interact with the targeted world object.
        const INTERACT = 1 << 3;
        /// Fire the active weapon.
        const SHOOT = 1 << 4;
        /// Aim down sights.
        const AIM = 1 << 5;
        /// Reload the active weapon.
        const RELOAD = 1 << 6;
        /// Select weapon slot 0.
        const WEAPON_1 = 1 << 7;
        /// Select weapon slot 1.
        const WEAPON_2 = 1 << 8;
    }
}

/// Individually debounced input button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    /// Jump.
    Jump,
    /// Crouch.
    Crouch,
    /// Sprint.
    Sprint,
    /// Interact.
    Interact,
    /// Shoot.
    Shoot,
    /// Aim.
    Aim,
    /// Reload.
    Reload,
    /// Weapon slot 0.
    Weapon1,
    /// Weapon slot 1.
    Weapon2,
}

impl Button {
    /// All buttons in declaration order.
    pub const ALL: [Button; 9] = [
        Button::Jump,
        Button::Crouch,
        Button::Sprint,
        Button::Interact,
        Button::Shoot,
        Button::Aim,
        Button::Reload,
        Button::Weapon1,
        Button::Weapon2,
    ];

    /// Bit for this button inside a [`ButtonSet`].
    pub fn flag(self) -> ButtonSet {
        match self {
            Button::Jump => ButtonSet::JUMP,
            Button::Crouch => ButtonSet::CROUCH,
            Button::Sprint => ButtonSet::SPRINT,
            Button::Interact => ButtonSet::INTERACT,
            Button::Shoot => ButtonSet::SHOOT,
            Button::Aim => ButtonSet::AIM,
            Button::Reload => ButtonSet::RELOAD,
            Button::Weapon1 => ButtonSet::WEAPON_1,
            Button::Weapon2 => ButtonSet::WEAPON_2,
        }
    }
}

/// Committed state of one button for one tick.
///
/// Callers pick the field they mean; there is no implicit "truthiness".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonEdge {
    held: bool,
    previous: bool,
}

impl ButtonEdge {
    /// Build from the committed and previously committed values.
    pub fn new(held: bool, previous: bool) -> Self {
        Self { held, previous }
    }

    /// Committed value for this tick.
    pub fn is_held(self) -> bool {
        self.held
    }

    /// False last tick, true this tick.
    pub fn pressed_this_tick(self) -> bool {
        self.held && !self.previous
    }

    /// True last tick, false this tick.
    pub fn released_this_tick(self) -> bool {
        !self.held && self.previous
    }
}

/// Committed input command for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TickInput {
    /// Movement axes: x strafes right, y moves forward. Magnitude <= 1.
    pub movement: Vec2,
    /// Accumulated look delta in degrees: x is yaw, y is pitch.
    pub look_delta: Vec2,
    /// Committed button values.
    pub held: ButtonSet,
    /// Button values committed on the previous tick.
    pub previous: ButtonSet,
}

impl TickInput {
    /// Edge record for `button`.
    pub fn button(&self, button: Button) -> ButtonEdge {
        let flag = button.flag();
        ButtonEdge::new(self.held.contains(flag), self.previous.contains(flag))
    }

    /// Shorthand for `self.button(button).pressed_this_tick()`.
    pub fn pressed(&self, button: Button) -> bool {
        self.button(button).pressed_this_tick()
    }

    /// Shorthand for `self.button(button).released_this_tick()`.
    pub fn released(&self, button: Button) -> bool {
        self.button(button).released_this_tick()
    }

    /// Shorthand for `self.button(button).is_held()`.
    pub fn held(&self, button: Button) -> bool {
        self.button(button).is_held()
    }

    /// Copy with movement zeroed and every button except `keep` cleared,
    /// in both the current and previous values so no edge is synthesized.
    pub fn neutralized(&self, keep: ButtonSet) -> TickInput {
        TickInput {
            movement: Vec2::ZERO,
            look_delta: self.look_delta,
            held: self.held & keep,
            previous: self.previous & keep,
        }
    }

    /// Replace non-finite values with zero and clamp movement to unit length.
    pub fn sanitized(mut self) -> TickInput {
        let finite = |v: Vec2| if v.is_finite() { v } else { Vec2::ZERO };
        self.movement = finite(self.movement).clamp_length_max(1.0);
        self.look_delta = finite(self.look_delta);
        self
    }

    /// True if every float is finite and the movement magnitude is at most 1.
    pub fn is_well_formed(&self) -> bool {
        self.movement.is_finite()
            && self.look_delta.is_finite()
            && self.movement.length_squared() <= 1.0 + 1e-4
    }
}
