#![warn(missing_docs)]
//! Core primitives shared across the workspace.

pub mod clock;
pub mod config;
pub mod inventory;
pub mod view;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use clock::TickClock;
pub use config::{
    AmmoSource, CombatConfig, ConfigError, GunConfig, MotionConfig, ReconcileConfig, SimConfig,
};
pub use inventory::{Inventory, ItemId, ItemStack, ResourcePool};
pub use view::{ViewBinding, ViewChange};

/// Entity identifier shared by every peer.
pub type EntityId = u64;

/// Peer (connection endpoint) identifier.
pub type PeerId = u32;

/// Fixed tick index (50 TPS by default => 20 ms per tick).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SimTick(pub u64);

impl SimTick {
    /// First tick in any deterministic timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks.
    pub fn advance(self, delta: u64) -> Self {
        Self(self.0 + delta)
    }

    /// Number of ticks elapsed since `earlier`, saturating at zero.
    pub fn since(self, earlier: SimTick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Previous tick, saturating at [`SimTick::ZERO`].
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl std::fmt::Display for SimTick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Helper to derive a reproducible RNG seeded by entity + stream + tick domains.
///
/// Every peer derives the same generator for the same inputs, so values drawn
/// inside the simulation step survive replay unchanged.
pub fn scoped_rng(entity: EntityId, stream: u64, tick: SimTick) -> StdRng {
    let seed = entity.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ stream.rotate_left(29)
        ^ tick.0.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    StdRng::seed_from_u64(seed)
}
