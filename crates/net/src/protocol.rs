//! Protocol message definitions for client-authority communication.
//!
//! All messages use postcard serialization for compact binary encoding.

use fpsim_core::{EntityId, SimTick};
use fpsim_input::TickInput;
use fpsim_sim::{CharacterSnapshot, Interactables};
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u16 = 1;

/// Protocol magic bytes to identify the fpsim protocol.
pub const PROTOCOL_MAGIC: &[u8; 8] = b"FPSM\x00\x01\x00\x00";

/// Maximum number of inputs carried by one bundle (newest plus redundant copies).
pub const MAX_REDUNDANT_INPUTS: usize = 16;

/// Maximum weapon slots carried by a snapshot.
pub const MAX_WEAPON_SLOTS: usize = 8;

/// Maximum inventory slots carried by a snapshot.
pub const MAX_INVENTORY_SLOTS: usize = 64;

/// Maximum interactables carried by one registry broadcast.
pub const MAX_INTERACTABLES: usize = 256;

/// Maximum length of a disconnect / rejection reason.
pub const MAX_REASON_LEN: usize = 256;

/// Largest accepted per-tick look delta in degrees.
pub const MAX_LOOK_DELTA: f32 = 720.0;

/// Messages sent from client to authority.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ClientMessage {
    /// Handshake request with protocol version and schema hash.
    Handshake {
        /// Protocol version.
        version: u16,
        /// Schema hash for compatibility.
        schema_hash: u64,
    },
    /// Committed inputs for the sender's entity.
    Input(InputBundle),
    /// Client is leaving.
    Disconnect {
        /// Free-form reason.
        reason: String,
    },
}

/// One committed input tagged with the tick it drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TickedInput {
    /// Tick the input was committed for.
    pub tick: SimTick,
    /// Committed input.
    pub input: TickInput,
}

/// The last few committed inputs of one entity, oldest first.
///
/// Each bundle repeats recent ticks so a single dropped packet loses nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputBundle {
    /// Entity the inputs drive.
    pub entity: EntityId,
    /// Inputs in strictly ascending tick order.
    pub inputs: Vec<TickedInput>,
}

impl InputBundle {
    /// Newest tick carried by the bundle.
    pub fn latest_tick(&self) -> Option<SimTick> {
        self.inputs.last().map(|i| i.tick)
    }

    /// Validate bounds and ordering before the inputs reach the simulation.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.inputs.is_empty() {
            return Err("empty input bundle");
        }
        if self.inputs.len() > MAX_REDUNDANT_INPUTS {
            return Err("too many inputs in bundle");
        }
        if self.inputs.windows(2).any(|w| w[0].tick >= w[1].tick) {
            return Err("input ticks not strictly ascending");
        }
        for ticked in &self.inputs {
            let input = &ticked.input;
            if !input.is_well_formed() {
                return Err("malformed input axes");
            }
            if input.look_delta.abs().max_element() > MAX_LOOK_DELTA {
                return Err("look delta out of range");
            }
        }
        Ok(())
    }
}

/// Authoritative reconciled state of one entity after a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciliationSnapshot {
    /// Tick whose post-step state this is.
    pub tick: SimTick,
    /// Entity described.
    pub entity: EntityId,
    /// Reconciled fields.
    pub state: CharacterSnapshot,
}

impl ReconciliationSnapshot {
    /// Validate the snapshot before it replaces local state.
    pub fn verify(&self) -> Result<(), &'static str> {
        let motion = &self.state.motion;
        if !(motion.position.is_finite() && motion.velocity.is_finite()) {
            return Err("non-finite kinematics");
        }
        if !motion.facing.is_finite() || motion.facing.y.abs() > 90.0 {
            return Err("facing out of range");
        }
        if self.state.weapons.len() > MAX_WEAPON_SLOTS {
            return Err("too many weapon slots");
        }
        if motion
            .active_slot
            .is_some_and(|slot| slot >= self.state.weapons.len())
        {
            return Err("active slot out of range");
        }
        let timers_finite = self.state.weapons.iter().all(|w| {
            w.shot_timer.is_finite()
                && w.reload_timer.is_finite()
                && w.aim_percent.is_finite()
                && w.recoil_velocity.is_finite()
        });
        if !timers_finite {
            return Err("non-finite weapon timers");
        }
        if self.state.inventory.slot_count() > MAX_INVENTORY_SLOTS {
            return Err("too many inventory slots");
        }
        if !self.state.health.is_well_formed() {
            return Err("health out of range");
        }
        Ok(())
    }
}

/// Authoritative interactable registry after a tick: locks, progress and
/// what each pickup has left. Depleted pickups are simply absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractableSnapshot {
    /// Tick whose post-step registry this is.
    pub tick: SimTick,
    /// Every live interactable.
    pub entries: Interactables,
}

impl InteractableSnapshot {
    /// Validate bounds before the registry replaces the client's view.
    pub fn verify(&self) -> Result<(), &'static str> {
        if self.entries.len() > MAX_INTERACTABLES {
            return Err("too many interactables");
        }
        if !self.entries.iter().all(|(_, i)| i.is_well_formed()) {
            return Err("malformed interactable");
        }
        Ok(())
    }
}

/// Messages sent from authority to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServerMessage {
    /// Handshake outcome.
    HandshakeResponse {
        /// Whether the client was admitted.
        accepted: bool,
        /// Rejection reason when not accepted.
        reason: Option<String>,
        /// Entity the client now controls.
        entity: Option<EntityId>,
        /// Next tick the authority will simulate.
        tick: SimTick,
    },
    /// Post-tick state of one entity.
    Snapshot(ReconciliationSnapshot),
    /// Post-tick interactable registry.
    Interactables(InteractableSnapshot),
    /// Authority is closing the session.
    Disconnect {
        /// Free-form reason.
        reason: String,
    },
}

impl ClientMessage {
    /// Validate message bounds.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ClientMessage::Handshake { .. } => Ok(()),
            ClientMessage::Input(bundle) => bundle.verify(),
            ClientMessage::Disconnect { reason } => verify_reason(reason),
        }
    }
}

impl ServerMessage {
    /// Validate message bounds.
    pub fn verify(&self) -> Result<(), &'static str> {
        match self {
            ServerMessage::HandshakeResponse { reason, .. } => {
                reason.as_deref().map_or(Ok(()), verify_reason)
            }
            ServerMessage::Snapshot(snapshot) => snapshot.verify(),
            ServerMessage::Interactables(snapshot) => snapshot.verify(),
            ServerMessage::Disconnect { reason } => verify_reason(reason),
        }
    }
}

fn verify_reason(reason: &str) -> Result<(), &'static str> {
    if reason.len() > MAX_REASON_LEN {
        Err("reason too long")
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_sim::{CharacterState, Interactable, InteractableKind};
    use glam::{Vec2, Vec3};

    fn bundle(ticks: &[u64]) -> InputBundle {
        InputBundle {
            entity: 1,
            inputs: ticks
                .iter()
                .map(|&t| TickedInput {
                    tick: SimTick(t),
                    input: TickInput::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn bundle_requires_ascending_ticks() {
        assert!(bundle(&[3, 4, 5]).verify().is_ok());
        assert!(bundle(&[3, 3]).verify().is_err());
        assert!(bundle(&[5, 4]).verify().is_err());
        assert!(bundle(&[]).verify().is_err());
        let too_many: Vec<u64> = (0..=MAX_REDUNDANT_INPUTS as u64).collect();
        assert!(bundle(&too_many).verify().is_err());
    }

    #[test]
    fn bundle_rejects_bad_axes() {
        let mut b = bundle(&[1]);
        b.inputs[0].input.movement = Vec2::new(f32::NAN, 0.0);
        assert!(b.verify().is_err());
        b.inputs[0].input.movement = Vec2::new(2.0, 0.0);
        assert!(b.verify().is_err());
        b.inputs[0].input.movement = Vec2::ZERO;
        b.inputs[0].input.look_delta = Vec2::new(MAX_LOOK_DELTA * 2.0, 0.0);
        assert!(b.verify().is_err());
    }

    #[test]
    fn snapshot_rejects_non_finite_position() {
        let mut state = CharacterState::new(1, Vec3::ZERO);
        state.motion.position.x = f32::INFINITY;
        let snapshot = ReconciliationSnapshot {
            tick: SimTick(1),
            entity: 1,
            state: fpsim_sim::CharacterSnapshot {
                health: state.health,
                motion: state.motion,
                weapons: Vec::new(),
                interacting: None,
                inventory: state.inventory,
            },
        };
        assert_eq!(snapshot.verify(), Err("non-finite kinematics"));
    }

    #[test]
    fn snapshot_rejects_overfull_health() {
        let state = CharacterState::new(1, Vec3::ZERO);
        let mut snapshot = ReconciliationSnapshot {
            tick: SimTick(1),
            entity: 1,
            state: state.snapshot(&fpsim_sim::WeaponRegistry::new()),
        };
        assert!(snapshot.verify().is_ok());
        snapshot.state.health.damage(30.0);
        assert!(snapshot.verify().is_ok());
        snapshot.state.health = serde_json::from_str(r#"{"current":150.0,"max":100.0}"#).unwrap();
        assert_eq!(snapshot.verify(), Err("health out of range"));
    }

    #[test]
    fn interactable_broadcast_is_bounded() {
        let mut entries = Interactables::new();
        for id in 0..=MAX_INTERACTABLES as u64 {
            entries.insert(id, Interactable::new(1.0, InteractableKind::Generic));
        }
        let snapshot = InteractableSnapshot {
            tick: SimTick(3),
            entries,
        };
        assert_eq!(snapshot.verify(), Err("too many interactables"));

        let mut entries = Interactables::new();
        entries.insert(1, Interactable::new(f32::NAN, InteractableKind::Generic));
        let snapshot = InteractableSnapshot {
            tick: SimTick(3),
            entries,
        };
        assert_eq!(snapshot.verify(), Err("malformed interactable"));
    }

    #[test]
    fn long_reason_rejected() {
        let msg = ClientMessage::Disconnect {
            reason: "x".repeat(MAX_REASON_LEN + 1),
        };
        assert!(msg.verify().is_err());
    }
}
