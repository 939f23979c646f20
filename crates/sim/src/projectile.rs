//! Projectiles spawned from [`SimEvent::ShotFired`] and flown by the
//! authority.
//!
//! Each tick a projectile sweeps the segment it is about to travel against
//! world geometry and character bodies. The nearest hit ends its flight;
//! otherwise it moves, falls and ages until its lifetime runs out.

use crate::events::SimEvent;
use crate::state::CharacterState;
use fpsim_core::{CombatConfig, EntityId, MotionConfig};
use fpsim_physics::{Aabb, CollisionWorld, Ray};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Sweep slightly past the travelled distance so consecutive segments overlap.
const SWEEP_MARGIN: f32 = 1.01;

/// Hit volume of one living character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    /// Character.
    pub entity: EntityId,
    /// Box standing on the character's feet.
    pub bounds: Aabb,
}

impl Body {
    /// Body box of `state`, or `None` once it is dead.
    pub fn of(state: &CharacterState, motion: &MotionConfig, combat: &CombatConfig) -> Option<Self> {
        if !state.is_alive() {
            return None;
        }
        let feet = state.motion.position;
        let half = Vec3::new(motion.body_radius, 0.0, motion.body_radius);
        Some(Self {
            entity: state.entity,
            bounds: Aabb::new(feet - half, feet + half + Vec3::Y * combat.body_height),
        })
    }
}

/// Result of one projectile tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectileOutcome {
    /// Still in the air.
    Flying,
    /// Struck something and is gone.
    Hit {
        /// Character struck; `None` for world geometry.
        target: Option<EntityId>,
        /// Impact point.
        point: Vec3,
    },
    /// Lifetime ran out.
    Expired,
}

/// One projectile in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Shooter; never hit by its own projectile.
    pub owner: EntityId,
    /// Current position.
    pub position: Vec3,
    /// Current velocity.
    pub velocity: Vec3,
    /// Hit points removed on impact.
    pub damage: f32,
    /// Seconds flown.
    pub age: f32,
    /// Seconds before it expires.
    pub lifetime: f32,
}

impl Projectile {
    /// Launch from a shot event. Other events yield `None`.
    pub fn from_shot(event: &SimEvent) -> Option<Self> {
        match *event {
            SimEvent::ShotFired {
                entity,
                origin,
                direction,
                inherited_velocity,
                speed,
                damage,
                lifetime,
                ..
            } => Some(Self {
                owner: entity,
                position: origin,
                velocity: direction * speed + inherited_velocity,
                damage,
                age: 0.0,
                lifetime,
            }),
            _ => None,
        }
    }

    /// Fly one tick of length `dt`.
    pub fn advance(
        &mut self,
        world: &dyn CollisionWorld,
        bodies: &[Body],
        gravity: f32,
        dt: f32,
    ) -> ProjectileOutcome {
        if let Some((distance, target, ray)) = self.sweep(world, bodies, dt) {
            return ProjectileOutcome::Hit {
                target,
                point: ray.at(distance),
            };
        }

        self.position += self.velocity * dt;
        self.velocity += Vec3::NEG_Y * gravity * dt;
        self.age += dt;
        if self.age > self.lifetime {
            ProjectileOutcome::Expired
        } else {
            ProjectileOutcome::Flying
        }
    }

    fn sweep(
        &self,
        world: &dyn CollisionWorld,
        bodies: &[Body],
        dt: f32,
    ) -> Option<(f32, Option<EntityId>, Ray)> {
        let ray = Ray::new(self.position, self.velocity)?;
        let reach = self.velocity.length() * dt * SWEEP_MARGIN;

        let wall = world
            .raycast(&ray, reach, Some(self.owner))
            .map(|hit| (hit.distance, None));
        let body = bodies
            .iter()
            .filter(|body| body.entity != self.owner)
            .filter_map(|body| {
                body.bounds
                    .ray_intersection(&ray)
                    .map(|(distance, _)| (distance, Some(body.entity)))
            })
            .filter(|(distance, _)| *distance <= reach)
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let nearest = match (wall, body) {
            (Some(wall), Some(body)) => Some(if body.0 <= wall.0 { body } else { wall }),
            (wall, body) => wall.or(body),
        };
        nearest.map(|(distance, target)| (distance, target, ray))
    }
}
