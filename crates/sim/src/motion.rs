//! Kinematic sub-steps of the character step, each a pure function over
//! [`MotionState`].

use crate::state::{MotionState, MoveMode};
use fpsim_core::{EntityId, MotionConfig, SimTick};
use fpsim_input::{Button, TickInput};
use fpsim_physics::{CollisionWorld, Ray};
use glam::{Vec2, Vec3};

/// Differences below this are treated as already at target.
const FORCE_EPSILON: f32 = 1e-6;

/// Wrap yaw into `[0, 360)` and clamp pitch to `[-90, 90]`.
pub fn normalize_facing(facing: Vec2) -> Vec2 {
    let yaw = facing.x.rem_euclid(360.0);
    // rem_euclid rounds tiny negative yaws up to exactly 360.
    let yaw = if yaw >= 360.0 { 0.0 } else { yaw };
    Vec2::new(yaw, facing.y.clamp(-90.0, 90.0))
}

/// Apply the committed look delta.
pub fn integrate_facing(motion: &mut MotionState, look_delta: Vec2) {
    motion.facing = normalize_facing(motion.facing + look_delta);
}

/// Probe for ground under the body and snap onto it.
///
/// Skipped for a short grace window after a jump so the body does not
/// re-ground while rising.
pub fn check_ground(
    motion: &mut MotionState,
    world: &dyn CollisionWorld,
    config: &MotionConfig,
    dt: f32,
    tick: SimTick,
    entity: EntityId,
) {
    if let Some(jumped) = motion.last_jump_tick {
        if tick.since(jumped) < config.jump_ground_grace_ticks(dt) {
            motion.grounded = false;
            return;
        }
    }

    let origin = motion.position + Vec3::Y * config.ground_probe_length;
    let hit = Ray::new(origin, Vec3::NEG_Y).and_then(|ray| {
        world.raycast(
            &ray,
            config.ground_probe_length + config.ground_probe_skin,
            Some(entity),
        )
    });

    motion.grounded = hit.is_some();
    if let Some(hit) = hit {
        motion.position += (hit.point - motion.position).project_onto_normalized(hit.normal);
        let into_surface = hit.normal.dot(-motion.velocity).max(0.0);
        motion.velocity += hit.normal * into_surface;
    }
}

/// Resolve the move mode from input edges and capability gates.
pub fn resolve_move_mode(
    motion: &mut MotionState,
    input: &TickInput,
    interacting: bool,
    config: &MotionConfig,
) {
    if interacting {
        motion.move_mode = MoveMode::Walk;
        return;
    }

    let mut mode = motion.move_mode;
    if input.pressed(Button::Sprint) {
        mode = MoveMode::Sprint;
    }
    if input.released(Button::Sprint) && mode == MoveMode::Sprint {
        mode = MoveMode::Walk;
    }
    if input.pressed(Button::Crouch) {
        mode = MoveMode::Crouch;
    }
    if input.released(Button::Crouch) && mode == MoveMode::Crouch {
        mode = MoveMode::Walk;
    }
    if input.pressed(Button::Aim) && mode == MoveMode::Sprint {
        mode = MoveMode::Walk;
    }

    let can_sprint = config.can_sprint && input.movement.y > config.sprint_forward_threshold;
    let can_crouch = config.can_crouch && motion.grounded;
    if mode == MoveMode::Sprint && !can_sprint {
        mode = MoveMode::Walk;
    }
    if mode == MoveMode::Crouch && !can_crouch {
        mode = MoveMode::Walk;
    }
    motion.move_mode = mode;
}

/// Target horizontal speed for `mode`.
pub fn target_speed(mode: MoveMode, config: &MotionConfig) -> f32 {
    match mode {
        MoveMode::Walk => config.walk_speed,
        MoveMode::Sprint => config.sprint_speed,
        MoveMode::Crouch => config.crouch_speed,
    }
}

/// Accelerate horizontal velocity toward the requested direction without
/// overshooting the target speed. Vertical velocity is untouched.
pub fn apply_movement(motion: &mut MotionState, input: &TickInput, config: &MotionConfig, dt: f32) {
    let speed = target_speed(motion.move_mode, config);
    let mut acceleration = config.walk_speed / config.acceleration_time.max(dt);
    if !motion.grounded {
        acceleration *= 1.0 - config.air_acceleration_penalty;
    }

    let direction = (motion.right() * input.movement.x + motion.forward() * input.movement.y)
        .clamp_length_max(1.0);
    let horizontal = Vec3::new(motion.velocity.x, 0.0, motion.velocity.z);

    let (target, scale) = if motion.grounded {
        (direction * speed, 1.0)
    } else {
        (direction.normalize_or_zero() * speed, direction.length())
    };
    let difference = target - horizontal;
    let magnitude = difference.length();
    if magnitude < FORCE_EPSILON {
        return;
    }

    let force = difference * (acceleration / magnitude).min(1.0 / dt) * scale;
    motion.velocity.x += force.x * dt;
    motion.velocity.z += force.z * dt;
}

/// Launch upward on a fresh jump press while grounded.
pub fn apply_jump(motion: &mut MotionState, input: &TickInput, config: &MotionConfig, tick: SimTick) {
    if !(motion.grounded && input.pressed(Button::Jump)) {
        return;
    }
    let launch = (2.0 * config.gravity * config.jump_height).sqrt();
    motion.velocity.y += launch - motion.velocity.y;
    motion.grounded = false;
    motion.last_jump_tick = Some(tick);
}

/// Remove the horizontal velocity component driving the body into a wall.
pub fn clip_walls(
    motion: &mut MotionState,
    world: &dyn CollisionWorld,
    config: &MotionConfig,
    dt: f32,
    entity: EntityId,
) {
    let horizontal = Vec3::new(motion.velocity.x, 0.0, motion.velocity.z);
    let origin = motion.position + Vec3::Y * (config.eye_height * 0.5);
    let Some(ray) = Ray::new(origin, horizontal) else {
        return;
    };
    let reach = horizontal.length() * dt + config.body_radius;
    let Some(hit) = world.raycast(&ray, reach, Some(entity)) else {
        return;
    };

    let normal = Vec3::new(hit.normal.x, 0.0, hit.normal.z).normalize_or_zero();
    let into = motion.velocity.dot(normal);
    if into < 0.0 {
        motion.velocity -= normal * into;
    }
}

/// Apply gravity while airborne and advance position.
pub fn integrate(motion: &mut MotionState, config: &MotionConfig, dt: f32) {
    if !motion.grounded {
        motion.velocity.y -= config.gravity * dt;
    }
    motion.position += motion.velocity * dt;
}
