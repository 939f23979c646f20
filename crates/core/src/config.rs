//! Simulation tuning loaded from TOML.
//!
//! Every peer must run with identical values; the loaded config is part of the
//! determinism contract just like the inputs are.

use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Default location of the simulation config, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/sim.toml";

/// Errors raised while loading or validating a [`SimConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML text did not match the schema.
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] toml::de::Error),
    /// The config could not be rendered back to TOML.
    #[error("failed to serialize simulation config: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// A value is outside its allowed range.
    #[error("invalid simulation config: {0}")]
    Invalid(String),
}

/// Locomotion tuning for the motion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Target horizontal speed while walking (units/s).
    pub walk_speed: f32,
    /// Target horizontal speed while sprinting (units/s).
    pub sprint_speed: f32,
    /// Target horizontal speed while crouching (units/s).
    pub crouch_speed: f32,
    /// Seconds to reach walk speed from rest on the ground.
    pub acceleration_time: f32,
    /// Fraction of acceleration lost while airborne (0..=1).
    pub air_acceleration_penalty: f32,
    /// Apex height of a jump from flat ground.
    pub jump_height: f32,
    /// Downward acceleration magnitude.
    pub gravity: f32,
    /// View origin height above the feet.
    pub eye_height: f32,
    /// Horizontal body radius used by the wall clip.
    pub body_radius: f32,
    /// Maximum reach of the interaction probe.
    pub interaction_distance: f32,
    /// Sprint capability switch.
    pub can_sprint: bool,
    /// Crouch capability switch.
    pub can_crouch: bool,
    /// Forward axis value that must be exceeded to keep sprinting.
    pub sprint_forward_threshold: f32,
    /// Seconds after a jump during which the ground probe is skipped.
    pub jump_ground_grace: f32,
    /// Height above the feet the ground probe starts from.
    pub ground_probe_length: f32,
    /// Extra probe distance below the feet.
    pub ground_probe_skin: f32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            walk_speed: 6.0,
            sprint_speed: 13.0,
            crouch_speed: 4.0,
            acceleration_time: 0.4,
            air_acceleration_penalty: 0.8,
            jump_height: 0.8,
            gravity: 9.81,
            eye_height: 1.7,
            body_radius: 0.4,
            interaction_distance: 2.0,
            can_sprint: true,
            can_crouch: true,
            sprint_forward_threshold: 0.5,
            jump_ground_grace: 0.1,
            ground_probe_length: 1.0,
            ground_probe_skin: 0.1,
        }
    }
}

impl MotionConfig {
    /// Jump grace window in whole ticks of length `dt`.
    pub fn jump_ground_grace_ticks(&self, dt: f32) -> u64 {
        if dt <= 0.0 {
            return 0;
        }
        (self.jump_ground_grace / dt).round().max(0.0) as u64
    }
}

/// Where a gun refills its magazine from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmmoSource {
    /// Self-contained reserve counter carried by the weapon state.
    Reserve {
        /// Rounds in reserve when the weapon is first equipped.
        starting: u32,
    },
    /// Unlimited reloads.
    Infinite,
}

/// Tuning for a projectile gun.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GunConfig {
    /// Registry name (unique).
    pub name: String,
    /// Rounds per minute.
    pub firerate: f32,
    /// Require a fresh trigger press for every shot.
    pub single_fire: bool,
    /// Magazine capacity.
    pub magazine_size: u32,
    /// Reload duration in seconds.
    pub reload_time: f32,
    /// Seconds after activation before the gun can fire or reload.
    pub equip_time: f32,
    /// Seconds to go from hip to fully aimed.
    pub aim_time: f32,
    /// Field of view while fully aimed (degrees).
    pub aim_field_of_view: f32,
    /// Recoil impulse: x is the horizontal spread, y the vertical kick (deg/s).
    pub recoil_force: Vec2,
    /// Exponential recoil recovery rate (1/s).
    pub recoil_decay: f32,
    /// Muzzle speed of spawned projectiles.
    pub projectile_speed: f32,
    /// Hit points removed by one projectile.
    pub damage: f32,
    /// Seconds a projectile flies before it is discarded.
    pub projectile_lifetime: f32,
    /// Magazine refill source.
    pub ammo: AmmoSource,
}

impl Default for GunConfig {
    fn default() -> Self {
        Self::rifle()
    }
}

impl GunConfig {
    /// Automatic rifle preset.
    pub fn rifle() -> Self {
        Self {
            name: "rifle".into(),
            firerate: 600.0,
            single_fire: false,
            magazine_size: 30,
            reload_time: 2.0,
            equip_time: 0.5,
            aim_time: 0.2,
            aim_field_of_view: 60.0,
            recoil_force: Vec2::new(20.0, 60.0),
            recoil_decay: 12.0,
            projectile_speed: 120.0,
            damage: 20.0,
            projectile_lifetime: 3.0,
            ammo: AmmoSource::Reserve { starting: 90 },
        }
    }

    /// Semi-automatic pistol preset.
    pub fn pistol() -> Self {
        Self {
            name: "pistol".into(),
            firerate: 300.0,
            single_fire: true,
            magazine_size: 12,
            reload_time: 1.5,
            equip_time: 0.3,
            aim_time: 0.15,
            aim_field_of_view: 70.0,
            recoil_force: Vec2::new(10.0, 90.0),
            recoil_decay: 14.0,
            projectile_speed: 90.0,
            damage: 35.0,
            projectile_lifetime: 3.0,
            ammo: AmmoSource::Reserve { starting: 36 },
        }
    }

    /// Seconds between shots.
    pub fn shot_interval(&self) -> f32 {
        60.0 / self.firerate
    }
}

/// Prediction and reconciliation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Ticks of unacknowledged history kept per entity.
    pub buffer_capacity: usize,
    /// Previous inputs repeated in every input packet.
    pub input_redundancy: usize,
    /// Position error below which a correction is not counted as a mismatch.
    pub correction_epsilon: f32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 128,
            input_redundancy: 4,
            correction_epsilon: 1e-3,
        }
    }
}

/// Hit points and projectile hit volumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Hit points of a freshly spawned character.
    pub max_health: f32,
    /// Height of the body box projectiles test against.
    pub body_height: f32,
    /// Downward acceleration applied to projectiles.
    pub projectile_gravity: f32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            body_height: 1.8,
            projectile_gravity: 9.81,
        }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed ticks per second.
    pub tick_rate: u32,
    /// Weapon names equipped into slots 0 and 1 on spawn.
    pub loadout: Vec<String>,
    /// Locomotion tuning.
    pub motion: MotionConfig,
    /// Weapon definitions, registered in order.
    pub weapons: Vec<GunConfig>,
    /// Prediction tuning.
    pub reconcile: ReconcileConfig,
    /// Health and projectile tuning.
    pub combat: CombatConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 50,
            loadout: vec!["rifle".into(), "pistol".into()],
            motion: MotionConfig::default(),
            weapons: vec![GunConfig::rifle(), GunConfig::pistol()],
            reconcile: ReconcileConfig::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl SimConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default path, falling back to defaults on errors.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match Self::try_load_from_path(path) {
            Ok(config) => config,
            Err(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(
                    "Simulation config not found at {}. Using defaults",
                    path.display()
                );
                SimConfig::default()
            }
            Err(err) => {
                warn!("{err}. Using defaults");
                SimConfig::default()
            }
        }
    }

    /// Load from an explicit path, returning errors to the caller.
    pub fn try_load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Write the config as pretty TOML, creating parent directories.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, text).map_err(io_err)
    }

    /// Fixed tick duration in seconds.
    pub fn tick_delta(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Look up a weapon definition by name.
    pub fn weapon(&self, name: &str) -> Option<&GunConfig> {
        self.weapons.iter().find(|w| w.name == name)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.tick_rate == 0 {
            return invalid("tick_rate must be positive".into());
        }
        let m = &self.motion;
        for (name, value) in [
            ("walk_speed", m.walk_speed),
            ("sprint_speed", m.sprint_speed),
            ("crouch_speed", m.crouch_speed),
            ("gravity", m.gravity),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("motion.{name} must be positive, got {value}"));
            }
        }
        if !(0.0..=1.0).contains(&m.air_acceleration_penalty) {
            return invalid("motion.air_acceleration_penalty must be within 0..=1".into());
        }
        if m.jump_height < 0.0 || m.acceleration_time < 0.0 {
            return invalid("motion.jump_height and acceleration_time must not be negative".into());
        }
        if !(m.jump_ground_grace.is_finite() && m.jump_ground_grace >= 0.0) {
            return invalid("motion.jump_ground_grace must not be negative".into());
        }

        for weapon in &self.weapons {
            if weapon.magazine_size == 0 {
                return invalid(format!("weapon {} has an empty magazine", weapon.name));
            }
            if !(weapon.firerate.is_finite() && weapon.firerate > 0.0) {
                return invalid(format!("weapon {} needs a positive firerate", weapon.name));
            }
            if weapon.aim_time <= 0.0 {
                return invalid(format!("weapon {} needs a positive aim_time", weapon.name));
            }
            if !(weapon.damage.is_finite() && weapon.damage >= 0.0) {
                return invalid(format!("weapon {} has invalid damage", weapon.name));
            }
            if !(weapon.projectile_lifetime.is_finite() && weapon.projectile_lifetime > 0.0) {
                return invalid(format!(
                    "weapon {} needs a positive projectile_lifetime",
                    weapon.name
                ));
            }
            if self.weapons.iter().filter(|w| w.name == weapon.name).count() > 1 {
                return invalid(format!("duplicate weapon name {}", weapon.name));
            }
        }
        for name in &self.loadout {
            if self.weapon(name).is_none() {
                return invalid(format!("loadout references unknown weapon {name}"));
            }
        }
        if self.reconcile.buffer_capacity == 0 {
            return invalid("reconcile.buffer_capacity must be positive".into());
        }
        let c = &self.combat;
        if !(c.max_health.is_finite() && c.max_health >= 1.0) {
            return invalid(format!("combat.max_health must be at least 1, got {}", c.max_health));
        }
        if !(c.body_height.is_finite() && c.body_height > 0.0) {
            return invalid("combat.body_height must be positive".into());
        }
        if !c.projectile_gravity.is_finite() {
            return invalid("combat.projectile_gravity must be finite".into());
        }
        Ok(())
    }
}
