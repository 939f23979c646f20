//! Weapon capability interface, the projectile gun variant, and the registry
//! the step dispatches through.

use crate::events::SimEvent;
use crate::state::{EquippedWeapon, MotionState, MoveMode, WeaponState};
use fpsim_core::{scoped_rng, AmmoSource, EntityId, GunConfig, SimConfig, SimTick};
use fpsim_input::{Button, TickInput};
use glam::Vec2;
use rand::Rng;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{trace, warn};

/// Everything a weapon may read or write during one tick.
pub struct WeaponFrame<'a> {
    /// Owner.
    pub entity: EntityId,
    /// Loadout slot being stepped.
    pub slot: usize,
    /// Committed input (already neutralized during interactions).
    pub input: &'a TickInput,
    /// Owner kinematics; recoil writes into `facing`.
    pub motion: &'a mut MotionState,
    /// View origin height above the feet.
    pub eye_height: f32,
    /// Tick being simulated.
    pub tick: SimTick,
    /// Fixed ticks per second.
    pub tick_rate: u32,
    /// Fixed tick duration in seconds.
    pub dt: f32,
    /// Event sink for this step.
    pub events: &'a mut Vec<SimEvent>,
}

/// Read-only presentation of one weapon.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponView {
    /// Variant name.
    pub name: String,
    /// "magazine/reserve", with "∞" for unlimited reserves.
    pub ammo_text: String,
    /// Reload progress in `[0, 1]`, zero when not reloading.
    pub reload_fraction: f32,
    /// Aim blend in `[0, 1]`.
    pub aim_fraction: f32,
    /// Field of view while fully aimed.
    pub aim_field_of_view: f32,
}

/// Per-variant weapon behavior driven by the tick hooks.
pub trait WeaponBehavior: fmt::Debug + Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// State for a freshly equipped weapon.
    fn spawn_state(&self) -> WeaponState;

    /// Magazine capacity, or `None` for weapons without ammunition.
    fn magazine_size(&self) -> Option<u32>;

    /// Advance the active weapon by one tick.
    fn on_tick_step(&self, weapon: &mut WeaponState, frame: &mut WeaponFrame<'_>);

    /// Advance a holstered weapon by one tick.
    fn on_inactive_tick(&self, weapon: &mut WeaponState, tick: SimTick) {
        weapon.aim_percent = 0.0;
        weapon.last_disabled_tick = tick;
        weapon.reloading = false;
        weapon.reload_timer = 0.0;
    }

    /// Reconciled copy of `weapon` emitted after the tick.
    fn on_post_tick_snapshot(&self, weapon: &WeaponState) -> WeaponState {
        *weapon
    }

    /// Presentation data for `weapon`.
    fn view(&self, weapon: &WeaponState) -> WeaponView;
}

/// Magazine-fed projectile gun.
#[derive(Debug, Clone)]
pub struct Gun {
    config: GunConfig,
}

impl Gun {
    /// Build from its tuning.
    pub fn new(config: GunConfig) -> Self {
        Self { config }
    }

    /// Tuning.
    pub fn config(&self) -> &GunConfig {
        &self.config
    }

    fn equip_gated(&self, weapon: &WeaponState, frame: &WeaponFrame<'_>) -> bool {
        let elapsed = frame.tick.since(weapon.last_disabled_tick) as f32 / frame.tick_rate as f32;
        elapsed < self.config.equip_time
    }

    fn shoot(&self, weapon: &mut WeaponState, frame: &mut WeaponFrame<'_>) {
        if weapon.shot_timer > 0.0 {
            return;
        }
        if weapon.magazine == 0 {
            self.start_reload(weapon, frame);
            return;
        }

        weapon.shot_timer = self.config.shot_interval();
        weapon.magazine -= 1;
        frame.events.push(SimEvent::ShotFired {
            entity: frame.entity,
            slot: frame.slot,
            origin: frame.motion.eye(frame.eye_height),
            direction: frame.motion.view_forward(),
            inherited_velocity: frame.motion.velocity,
            speed: self.config.projectile_speed,
            damage: self.config.damage,
            lifetime: self.config.projectile_lifetime,
        });

        let mut rng = scoped_rng(frame.entity, frame.slot as u64, frame.tick);
        let spread = self.config.recoil_force.x;
        let kick = Vec2::new(
            spread * (2.0 * rng.gen::<f32>() - 1.0),
            self.config.recoil_force.y,
        );
        weapon.recoil_velocity += kick;
        trace!(
            entity = frame.entity,
            tick = frame.tick.0,
            magazine = weapon.magazine,
            "shot fired"
        );
    }

    fn start_reload(&self, weapon: &mut WeaponState, frame: &mut WeaponFrame<'_>) {
        if weapon.magazine >= self.config.magazine_size || weapon.reserve == Some(0) {
            return;
        }

        if let Some(reserve) = weapon.reserve.as_mut() {
            *reserve = reserve.saturating_add(weapon.magazine);
        }
        weapon.magazine = 0;
        weapon.reloading = true;
        weapon.reload_timer = self.config.reload_time.max(frame.dt);
        frame.events.push(SimEvent::ReloadStarted {
            entity: frame.entity,
            slot: frame.slot,
        });
    }

    fn finish_reload(&self, weapon: &mut WeaponState, frame: &mut WeaponFrame<'_>) {
        let capacity = self.config.magazine_size;
        let drawn = match weapon.reserve.as_mut() {
            Some(reserve) => {
                let drawn = (*reserve).min(capacity);
                *reserve -= drawn;
                drawn
            }
            None => capacity,
        };
        weapon.magazine = drawn;
        weapon.reloading = false;
        weapon.reload_timer = 0.0;
        frame.events.push(SimEvent::ReloadCompleted {
            entity: frame.entity,
            slot: frame.slot,
            magazine: drawn,
        });
    }
}

impl WeaponBehavior for Gun {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn spawn_state(&self) -> WeaponState {
        WeaponState {
            magazine: self.config.magazine_size,
            reserve: match self.config.ammo {
                AmmoSource::Reserve { starting } => Some(starting),
                AmmoSource::Infinite => None,
            },
            ..WeaponState::default()
        }
    }

    fn magazine_size(&self) -> Option<u32> {
        Some(self.config.magazine_size)
    }

    fn on_tick_step(&self, weapon: &mut WeaponState, frame: &mut WeaponFrame<'_>) {
        let dt = frame.dt;

        if self.equip_gated(weapon, frame) {
            // Still equipping: no firing or reloading.
        } else if weapon.reloading {
            weapon.reload_timer -= dt;
            if weapon.reload_timer <= 0.0 {
                self.finish_reload(weapon, frame);
            }
        } else {
            let input = frame.input;
            if input.pressed(Button::Shoot)
                || (input.held(Button::Shoot) && !self.config.single_fire)
            {
                self.shoot(weapon, frame);
            }
            if input.pressed(Button::Reload) {
                self.start_reload(weapon, frame);
            }
        }

        weapon.recoil_velocity -= weapon.recoil_velocity * (self.config.recoil_decay * dt).min(1.0);
        let facing = frame.motion.facing + weapon.recoil_velocity * dt;
        frame.motion.facing = crate::motion::normalize_facing(facing);

        let aiming = frame.input.held(Button::Aim)
            && frame.motion.move_mode != MoveMode::Sprint
            && frame.motion.grounded
            && !weapon.reloading;
        let target = if aiming { 1.0 } else { 0.0 };
        weapon.aim_percent = move_towards(weapon.aim_percent, target, dt / self.config.aim_time);

        weapon.shot_timer = (weapon.shot_timer - dt).max(0.0);
    }

    fn view(&self, weapon: &WeaponState) -> WeaponView {
        let reserve = weapon
            .reserve
            .map_or_else(|| "\u{221e}".to_string(), |r| r.to_string());
        let reload_fraction = if weapon.reloading && self.config.reload_time > 0.0 {
            (1.0 - weapon.reload_timer / self.config.reload_time).clamp(0.0, 1.0)
        } else {
            0.0
        };
        WeaponView {
            name: self.config.name.clone(),
            ammo_text: format!("{}/{}", weapon.magazine, reserve),
            reload_fraction,
            aim_fraction: weapon.aim_percent,
            aim_field_of_view: self.config.aim_field_of_view,
        }
    }
}

fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

/// Weapon variants by name.
#[derive(Debug, Default)]
pub struct WeaponRegistry {
    variants: BTreeMap<String, Box<dyn WeaponBehavior>>,
}

impl WeaponRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one [`Gun`] per configured weapon.
    pub fn from_config(config: &SimConfig) -> Self {
        let mut registry = Self::new();
        for gun in &config.weapons {
            registry.register(Box::new(Gun::new(gun.clone())));
        }
        registry
    }

    /// Register a variant, returning the one it replaced.
    pub fn register(&mut self, behavior: Box<dyn WeaponBehavior>) -> Option<Box<dyn WeaponBehavior>> {
        self.variants.insert(behavior.name().to_string(), behavior)
    }

    /// Look up a variant.
    pub fn get(&self, name: &str) -> Option<&dyn WeaponBehavior> {
        self.variants.get(name).map(Box::as_ref)
    }

    /// Number of registered variants.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Fresh weapons for `names`; unknown names are skipped with a warning.
    pub fn equip(&self, names: &[String]) -> Vec<EquippedWeapon> {
        names
            .iter()
            .filter_map(|name| match self.get(name) {
                Some(behavior) => Some(EquippedWeapon {
                    kind: name.clone(),
                    state: behavior.spawn_state(),
                }),
                None => {
                    warn!(weapon = %name, "unknown weapon in loadout");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpsim_input::ButtonSet;

    const TICK_RATE: u32 = 50;
    const DT: f32 = 1.0 / TICK_RATE as f32;

    fn gun(magazine_size: u32) -> Gun {
        Gun::new(GunConfig {
            magazine_size,
            equip_time: 0.0,
            ..GunConfig::rifle()
        })
    }

    fn run(
        gun: &Gun,
        weapon: &mut WeaponState,
        motion: &mut MotionState,
        input: &TickInput,
        tick: u64,
    ) -> Vec<SimEvent> {
        let mut events = Vec::new();
        let mut frame = WeaponFrame {
            entity: 1,
            slot: 0,
            input,
            motion,
            eye_height: 1.7,
            tick: SimTick(tick),
            tick_rate: TICK_RATE,
            dt: DT,
            events: &mut events,
        };
        gun.on_tick_step(weapon, &mut frame);
        events
    }

    fn press(button: ButtonSet) -> TickInput {
        TickInput {
            held: button,
            ..TickInput::default()
        }
    }

    #[test]
    fn reload_draws_from_reserve() {
        let gun = gun(10);
        let mut motion = MotionState::default();
        let mut weapon = WeaponState {
            magazine: 0,
            reserve: Some(30),
            ..WeaponState::default()
        };

        let events = run(&gun, &mut weapon, &mut motion, &press(ButtonSet::RELOAD), 1);
        assert!(matches!(events[..], [SimEvent::ReloadStarted { .. }]));
        assert!(weapon.reloading);

        let idle = TickInput::default();
        let mut tick = 2;
        while weapon.reloading {
            run(&gun, &mut weapon, &mut motion, &idle, tick);
            tick += 1;
        }
        assert_eq!(weapon.magazine, 10);
        assert_eq!(weapon.reserve, Some(20));
        assert_eq!(weapon.reload_timer, 0.0);
    }

    #[test]
    fn reload_without_reserve_is_noop() {
        let gun = gun(10);
        let mut motion = MotionState::default();
        let mut weapon = WeaponState {
            magazine: 0,
            reserve: Some(0),
            ..WeaponState::default()
        };
        let events = run(&gun, &mut weapon, &mut motion, &press(ButtonSet::RELOAD), 1);
        assert!(events.is_empty());
        assert!(!weapon.reloading);
        assert_eq!(weapon.magazine, 0);
    }

    #[test]
    fn reload_returns_partial_magazine() {
        let gun = gun(10);
        let mut motion = MotionState::default();
        let mut weapon = WeaponState {
            magazine: 4,
            reserve: Some(3),
            ..WeaponState::default()
        };
        run(&gun, &mut weapon, &mut motion, &press(ButtonSet::RELOAD), 1);
        assert_eq!(weapon.magazine, 0);
        assert_eq!(weapon.reserve, Some(7));
    }

    #[test]
    fn single_fire_needs_fresh_press() {
        let gun = Gun::new(GunConfig {
            equip_time: 0.0,
            ..GunConfig::pistol()
        });
        let mut motion = MotionState::default();
        let mut weapon = gun.spawn_state();

        let first = press(ButtonSet::SHOOT);
        assert_eq!(run(&gun, &mut weapon, &mut motion, &first, 1).len(), 1);

        let held = TickInput {
            held: ButtonSet::SHOOT,
            previous: ButtonSet::SHOOT,
            ..TickInput::default()
        };
        for tick in 2..40 {
            assert!(run(&gun, &mut weapon, &mut motion, &held, tick).is_empty());
        }
        assert_eq!(weapon.magazine, 11);
    }

    #[test]
    fn empty_magazine_triggers_reload() {
        let gun = gun(10);
        let mut motion = MotionState::default();
        let mut weapon = WeaponState {
            magazine: 0,
            reserve: Some(5),
            ..WeaponState::default()
        };
        let events = run(&gun, &mut weapon, &mut motion, &press(ButtonSet::SHOOT), 1);
        assert!(matches!(events[..], [SimEvent::ReloadStarted { .. }]));
    }

    #[test]
    fn equip_delay_blocks_firing() {
        let gun = Gun::new(GunConfig {
            equip_time: 0.5,
            ..GunConfig::rifle()
        });
        let mut motion = MotionState::default();
        let mut weapon = gun.spawn_state();
        weapon.last_disabled_tick = SimTick(10);

        let shoot = press(ButtonSet::SHOOT);
        assert!(run(&gun, &mut weapon, &mut motion, &shoot, 20).is_empty());
        assert_eq!(run(&gun, &mut weapon, &mut motion, &shoot, 35).len(), 1);
    }

    #[test]
    fn recoil_kicks_facing_up_and_decays() {
        let gun = gun(10);
        let mut motion = MotionState::default();
        let mut weapon = gun.spawn_state();
        run(&gun, &mut weapon, &mut motion, &press(ButtonSet::SHOOT), 1);
        assert!(motion.facing.y > 0.0);

        let kick = weapon.recoil_velocity.length();
        run(&gun, &mut weapon, &mut motion, &TickInput::default(), 2);
        assert!(weapon.recoil_velocity.length() < kick);
    }

    #[test]
    fn aim_blends_and_blocks_while_sprinting() {
        let gun = gun(10);
        let mut motion = MotionState {
            grounded: true,
            ..MotionState::default()
        };
        let mut weapon = gun.spawn_state();
        let aim = TickInput {
            held: ButtonSet::AIM,
            previous: ButtonSet::AIM,
            ..TickInput::default()
        };
        for tick in 0..20 {
            run(&gun, &mut weapon, &mut motion, &aim, tick);
        }
        assert_eq!(weapon.aim_percent, 1.0);

        motion.move_mode = MoveMode::Sprint;
        run(&gun, &mut weapon, &mut motion, &aim, 21);
        assert!(weapon.aim_percent < 1.0);
    }

    #[test]
    fn inactive_weapons_stamp_disable_tick() {
        let gun = gun(10);
        let mut weapon = WeaponState {
            reloading: true,
            reload_timer: 0.5,
            aim_percent: 0.7,
            ..gun.spawn_state()
        };
        gun.on_inactive_tick(&mut weapon, SimTick(42));
        assert_eq!(weapon.last_disabled_tick, SimTick(42));
        assert!(!weapon.reloading);
        assert_eq!(weapon.reload_timer, 0.0);
        assert_eq!(weapon.aim_percent, 0.0);
    }

    #[test]
    fn view_formats_ammo() {
        let gun = Gun::new(GunConfig {
            ammo: AmmoSource::Infinite,
            ..GunConfig::rifle()
        });
        let weapon = gun.spawn_state();
        assert_eq!(gun.view(&weapon).ammo_text, "30/\u{221e}");

        let gun = Gun::new(GunConfig::pistol());
        assert_eq!(gun.view(&gun.spawn_state()).ammo_text, "12/36");
    }

    #[test]
    fn registry_equips_loadout() {
        let registry = WeaponRegistry::from_config(&SimConfig::default());
        assert_eq!(registry.len(), 2);
        let weapons = registry.equip(&["pistol".into(), "bogus".into()]);
        assert_eq!(weapons.len(), 1);
        assert_eq!(weapons[0].state.magazine, 12);
    }
}
