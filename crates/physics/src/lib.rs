#![warn(missing_docs)]
//! Collision primitives and the world ray query used by the simulation.
//!
//! Queries are read-only and iterate colliders in insertion order, so two
//! peers holding the same world answer every probe identically.

use fpsim_core::EntityId;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Rays shorter than this, or direction components smaller than this, are
/// treated as degenerate.
const RAY_EPSILON: f32 = 1e-6;

/// Axis-aligned bounding box used for collisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vec3,
    /// Maximum corner.
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB, reordering corners so `min <= max` per axis.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box centred on `center` with full extents `size`.
    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Tests intersection with another AABB (touching counts).
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// True if `point` lies inside or on the boundary.
    pub fn contains(&self, point: Vec3) -> bool {
        self.min.cmple(point).all() && self.max.cmpge(point).all()
    }

    /// Slab test. Returns the entry distance and the normal of the entered
    /// face. Rays starting inside the box report no hit.
    pub fn ray_intersection(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let dir = ray.direction[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if dir.abs() < RAY_EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / dir;
            let (mut t0, mut t1) = ((lo - origin) * inv, (hi - origin) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            if t0 > t_enter {
                t_enter = t0;
                normal = Vec3::ZERO;
                normal[axis] = -dir.signum();
            }
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }

        if t_enter < 0.0 || !t_enter.is_finite() {
            return None;
        }
        Some((t_enter, normal))
    }
}

/// Half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
}

impl Ray {
    /// Build a ray, normalizing `direction`. Returns `None` for a zero or
    /// non-finite direction.
    pub fn new(origin: Vec3, direction: Vec3) -> Option<Self> {
        let direction = direction.try_normalize()?;
        origin.is_finite().then_some(Self { origin, direction })
    }

    /// Point at distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest hit reported by a world query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    /// World-space hit point.
    pub point: Vec3,
    /// Unit surface normal at the hit point.
    pub normal: Vec3,
    /// Distance from the ray origin.
    pub distance: f32,
    /// Entity owning the struck collider, if any.
    pub owner: Option<EntityId>,
}

/// Ray probe against static and dynamic geometry.
pub trait CollisionWorld {
    /// Nearest hit within `max_distance`, skipping colliders owned by `ignore`.
    fn raycast(&self, ray: &Ray, max_distance: f32, ignore: Option<EntityId>) -> Option<RayHit>;
}

/// Collision geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    /// Solid box.
    Box(Aabb),
    /// One-sided infinite plane `dot(normal, p) = offset`, solid below.
    Plane {
        /// Unit normal pointing out of the solid side.
        normal: Vec3,
        /// Signed distance of the plane from the origin.
        offset: f32,
    },
}

impl Shape {
    /// Plane through `point` facing `normal`. Returns `None` for a zero normal.
    pub fn plane_through(point: Vec3, normal: Vec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Shape::Plane {
            normal,
            offset: normal.dot(point),
        })
    }

    fn intersect(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        match *self {
            Shape::Box(aabb) => aabb.ray_intersection(ray),
            Shape::Plane { normal, offset } => {
                let denom = ray.direction.dot(normal);
                // Back faces and grazing rays do not hit.
                if denom > -RAY_EPSILON {
                    return None;
                }
                let t = (offset - ray.origin.dot(normal)) / denom;
                (t >= 0.0).then_some((t, normal))
            }
        }
    }
}

/// A shape optionally owned by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    /// Geometry.
    pub shape: Shape,
    /// Owning entity (for self-hit exclusion and interactable lookup).
    pub owner: Option<EntityId>,
}

/// Flat list of colliders, scanned linearly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticWorld {
    colliders: Vec<Collider>,
}

impl StaticWorld {
    /// Empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// World containing a horizontal ground plane at `height`.
    pub fn with_ground(height: f32) -> Self {
        let mut world = Self::new();
        world.add_plane(Vec3::new(0.0, height, 0.0), Vec3::Y, None);
        world
    }

    /// Add a box collider.
    pub fn add_box(&mut self, aabb: Aabb, owner: Option<EntityId>) -> &mut Self {
        self.colliders.push(Collider {
            shape: Shape::Box(aabb),
            owner,
        });
        self
    }

    /// Add a plane collider. Zero normals are ignored.
    pub fn add_plane(&mut self, point: Vec3, normal: Vec3, owner: Option<EntityId>) -> &mut Self {
        if let Some(shape) = Shape::plane_through(point, normal) {
            self.colliders.push(Collider { shape, owner });
        }
        self
    }

    /// Remove every collider owned by `owner`, returning how many were removed.
    pub fn remove_owned(&mut self, owner: EntityId) -> usize {
        let before = self.colliders.len();
        self.colliders.retain(|c| c.owner != Some(owner));
        before - self.colliders.len()
    }

    /// Registered colliders in query order.
    pub fn colliders(&self) -> &[Collider] {
        &self.colliders
    }
}

impl CollisionWorld for StaticWorld {
    fn raycast(&self, ray: &Ray, max_distance: f32, ignore: Option<EntityId>) -> Option<RayHit> {
        if max_distance.is_nan() || max_distance <= 0.0 {
            return None;
        }

        let mut best: Option<RayHit> = None;
        for collider in &self.colliders {
            if ignore.is_some() && collider.owner == ignore {
                continue;
            }
            let Some((distance, normal)) = collider.shape.intersect(ray) else {
                continue;
            };
            // Strict comparison keeps the earliest collider on ties.
            if distance <= max_distance && best.map_or(true, |b| distance < b.distance) {
                best = Some(RayHit {
                    point: ray.at(distance),
                    normal,
                    distance,
                    owner: collider.owner,
                });
            }
        }
        best
    }
}
