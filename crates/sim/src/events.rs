//! Observable side effects produced by a step.
//!
//! A step never applies these itself. The caller forwards them on the first
//! execution of a tick and drops them when the tick is replayed.

use fpsim_core::EntityId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Discrete events for presentation and gameplay consumers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SimEvent {
    /// A projectile should be spawned.
    ShotFired {
        /// Shooter.
        entity: EntityId,
        /// Loadout slot of the gun.
        slot: usize,
        /// Spawn position (view origin).
        origin: Vec3,
        /// Unit launch direction.
        direction: Vec3,
        /// Shooter velocity added to the projectile.
        inherited_velocity: Vec3,
        /// Muzzle speed.
        speed: f32,
        /// Hit points removed on impact.
        damage: f32,
        /// Seconds before the projectile is discarded.
        lifetime: f32,
    },
    /// A reload countdown began.
    ReloadStarted {
        /// Owner.
        entity: EntityId,
        /// Loadout slot.
        slot: usize,
    },
    /// A reload countdown finished.
    ReloadCompleted {
        /// Owner.
        entity: EntityId,
        /// Loadout slot.
        slot: usize,
        /// Rounds in the refilled magazine.
        magazine: u32,
    },
    /// The active slot changed.
    WeaponSwitched {
        /// Owner.
        entity: EntityId,
        /// Newly active slot.
        slot: usize,
    },
    /// An interactable lock was taken.
    InteractionStarted {
        /// Interactor.
        entity: EntityId,
        /// Interactable.
        target: EntityId,
    },
    /// An interactable lock was released before completion.
    InteractionStopped {
        /// Interactor.
        entity: EntityId,
        /// Interactable.
        target: EntityId,
    },
    /// An interaction ran to completion.
    InteractionCompleted {
        /// Interactor.
        entity: EntityId,
        /// Interactable.
        target: EntityId,
    },
    /// A projectile struck a character.
    Damaged {
        /// Character hit.
        entity: EntityId,
        /// Shooter.
        by: EntityId,
        /// Hit points removed.
        amount: f32,
        /// Hit points left.
        remaining: f32,
    },
    /// A character's health reached zero.
    Died {
        /// Character that died.
        entity: EntityId,
        /// Shooter of the final hit.
        by: EntityId,
    },
    /// A dead character was brought back.
    Revived {
        /// Character revived.
        entity: EntityId,
        /// Hit points after revival.
        health: f32,
    },
}

/// Lock changes requested by a step against the interactable registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionCommand {
    /// Take the lock on `target`.
    Start {
        /// Interactor.
        interactor: EntityId,
        /// Interactable.
        target: EntityId,
    },
    /// Release the lock on `target` and reset its progress.
    Stop {
        /// Interactor.
        interactor: EntityId,
        /// Interactable.
        target: EntityId,
    },
}

/// Side effects of one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepEffects {
    /// Events in emission order.
    pub events: Vec<SimEvent>,
    /// Registry commands in emission order.
    pub commands: Vec<InteractionCommand>,
}

impl StepEffects {
    /// True if the step produced nothing observable.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.commands.is_empty()
    }

    /// Number of shots fired.
    pub fn shots(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SimEvent::ShotFired { .. }))
            .count()
    }
}
