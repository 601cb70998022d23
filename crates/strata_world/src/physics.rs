//! Collision and raycast queries against resolved block shapes. Read-only
//! over the world; unloaded space never collides and is never hit.

use glam::{IVec3, Vec3};

use crate::block::BlockId;
use crate::shape::BlockShape;
use crate::world::World;

/// Longest ray the grid walk will follow; longer or non-finite limits are
/// clamped to it.
pub const MAX_RAYCAST_DISTANCE: f32 = 512.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Strict overlap: boxes that only share a face do not intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb::new(self.min + offset, self.max + offset)
    }

    /// Slab test. Returns the entry and exit distances along the ray, and the
    /// axis crossed on entry.
    fn ray_interval(&self, ray: &Ray) -> Option<(f32, f32, usize)> {
        let mut t_near = f32::NEG_INFINITY;
        let mut t_far = f32::INFINITY;
        let mut near_axis = 0;

        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];
            if direction == 0.0 {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin) / direction;
            let t1 = (self.max[axis] - origin) / direction;
            let (enter, exit) = if t0 < t1 { (t0, t1) } else { (t1, t0) };
            if enter > t_near {
                t_near = enter;
                near_axis = axis;
            }
            t_far = t_far.min(exit);
        }

        (t_near <= t_far).then_some((t_near, t_far, near_axis))
    }
}

/// An actor's body: centred on x/z, standing on `y`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CollisionBox {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub half_width: f32,
    pub height: f32,
}

impl CollisionBox {
    pub fn new(x: f32, y: f32, z: f32, half_width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            z,
            half_width,
            height,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(
            Vec3::new(self.x - self.half_width, self.y, self.z - self.half_width),
            Vec3::new(
                self.x + self.half_width,
                self.y + self.height,
                self.z + self.half_width,
            ),
        )
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Face {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl Face {
    pub fn normal_ivec3(&self) -> IVec3 {
        match self {
            Face::PosX => IVec3::X,
            Face::NegX => IVec3::NEG_X,
            Face::PosY => IVec3::Y,
            Face::NegY => IVec3::NEG_Y,
            Face::PosZ => IVec3::Z,
            Face::NegZ => IVec3::NEG_Z,
        }
    }

    /// Face a ray travelling along `axis` with sign `step` enters through.
    fn entered(axis: usize, step: i32) -> Face {
        match (axis, step > 0) {
            (0, true) => Face::NegX,
            (0, false) => Face::PosX,
            (1, true) => Face::NegY,
            (1, false) => Face::PosY,
            (_, true) => Face::NegZ,
            (_, false) => Face::PosZ,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RaycastHit {
    pub block_pos: IVec3,
    pub block: BlockId,
    pub face: Face,
    pub distance: f32,
}

impl RaycastHit {
    /// Where a block placed against the hit face would go.
    pub fn placement_pos(&self) -> IVec3 {
        self.block_pos + self.face.normal_ivec3()
    }
}

/// One cell visited by the grid walk, with the ray distances at which it is
/// entered and left.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct VoxelStep {
    pub pos: IVec3,
    pub face: Face,
    pub enter: f32,
    pub exit: f32,
}

#[derive(Debug, Copy, Clone)]
pub struct RaycastIter {
    current: IVec3,
    step: IVec3,
    t_max: Vec3,
    t_delta: Vec3,
    t_current: f32,
    max_distance: f32,
    finished: bool,
    last_face: Face,
}

impl RaycastIter {
    fn new(ray: &Ray, max_distance: f32) -> Self {
        let direction = ray.direction;
        let step = IVec3::new(
            step_sign(direction.x),
            step_sign(direction.y),
            step_sign(direction.z),
        );
        let current = ray.origin.floor().as_ivec3();

        let mut t_max = Vec3::splat(f32::INFINITY);
        let mut t_delta = Vec3::splat(f32::INFINITY);
        for axis in 0..3 {
            if direction[axis] == 0.0 {
                continue;
            }
            let boundary = if step[axis] > 0 {
                current[axis] as f32 + 1.0
            } else {
                current[axis] as f32
            };
            t_max[axis] = (boundary - ray.origin[axis]) / direction[axis];
            t_delta[axis] = 1.0 / direction[axis].abs();
        }

        // A ray starting inside a cell reports the face its dominant axis
        // would have entered through.
        let magnitude = direction.abs();
        let dominant = if magnitude.x >= magnitude.y && magnitude.x >= magnitude.z {
            0
        } else if magnitude.y >= magnitude.z {
            1
        } else {
            2
        };

        Self {
            current,
            step,
            t_max,
            t_delta,
            t_current: 0.0,
            max_distance: clamp_distance(max_distance),
            finished: !ray.origin.is_finite(),
            last_face: Face::entered(dominant, step[dominant]),
        }
    }
}

impl Iterator for RaycastIter {
    type Item = VoxelStep;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.t_current > self.max_distance {
            return None;
        }

        let (axis, distance) = if self.t_max.x <= self.t_max.y && self.t_max.x <= self.t_max.z {
            (0usize, self.t_max.x)
        } else if self.t_max.y <= self.t_max.z {
            (1usize, self.t_max.y)
        } else {
            (2usize, self.t_max.z)
        };

        let visited = VoxelStep {
            pos: self.current,
            face: self.last_face,
            enter: self.t_current,
            exit: distance.min(self.max_distance),
        };

        if !distance.is_finite() || distance > self.max_distance {
            self.finished = true;
            return Some(visited);
        }

        self.current[axis] += self.step[axis];
        self.t_max[axis] += self.t_delta[axis];
        self.t_current = distance;
        self.last_face = Face::entered(axis, self.step[axis]);

        Some(visited)
    }
}

/// Every cell a ray passes through, in order, up to `max_distance`.
pub fn raycast_blocks(ray: &Ray, max_distance: f32) -> impl Iterator<Item = VoxelStep> {
    RaycastIter::new(ray, max_distance)
}

/// Whether `body` overlaps any solid sub-shape in the world.
pub fn check_collision(world: &World, body: &CollisionBox) -> bool {
    let aabb = body.aabb();
    overlapping_cells(&aabb).any(|pos| shape_overlaps(world, pos, &aabb))
}

/// Every cell whose resolved shape overlaps `body`.
pub fn colliding_blocks(world: &World, body: &CollisionBox) -> Vec<IVec3> {
    let aabb = body.aabb();
    overlapping_cells(&aabb)
        .filter(|&pos| shape_overlaps(world, pos, &aabb))
        .collect()
}

/// Whether `body` touches any fluid cell.
pub fn fluid_intersection(world: &World, body: &CollisionBox) -> bool {
    let aabb = body.aabb();
    overlapping_cells(&aabb).any(|pos| {
        world.registry().is_fluid(world.get_block(pos))
            && unit_cell(pos).intersects(&aabb)
    })
}

/// First solid block along the ray within `max_distance`. Slabs and stairs
/// only count when the ray crosses their solid part; other solid blocks are
/// hit on entry to their cell.
pub fn raycast(world: &World, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<RaycastHit> {
    let direction = direction.normalize_or_zero();
    if direction == Vec3::ZERO {
        return None;
    }
    let ray = Ray { origin, direction };
    let max_distance = clamp_distance(max_distance);

    for step in raycast_blocks(&ray, max_distance) {
        let block = world.get_block(step.pos);
        let shape = BlockShape::resolve(world, step.pos);
        let offset = step.pos.as_vec3();

        let mut best: Option<(f32, Face)> = None;
        for part in shape.raycast_boxes() {
            let Some((t_near, t_far, axis)) = part.translated(offset).ray_interval(&ray) else {
                continue;
            };
            if t_far < step.enter || t_near > step.exit {
                continue;
            }
            let (distance, face) = if t_near > step.enter {
                (t_near, Face::entered(axis, step_sign(ray.direction[axis])))
            } else {
                (step.enter, step.face)
            };
            if best.map_or(true, |(current, _)| distance < current) {
                best = Some((distance, face));
            }
        }

        if let Some((distance, face)) = best {
            if distance <= max_distance {
                return Some(RaycastHit {
                    block_pos: step.pos,
                    block,
                    face,
                    distance,
                });
            }
        }
    }

    None
}

fn clamp_distance(max_distance: f32) -> f32 {
    if max_distance.is_nan() {
        0.0
    } else {
        max_distance.clamp(0.0, MAX_RAYCAST_DISTANCE)
    }
}

fn step_sign(value: f32) -> i32 {
    if value > 0.0 {
        1
    } else if value < 0.0 {
        -1
    } else {
        0
    }
}

fn unit_cell(pos: IVec3) -> Aabb {
    let min = pos.as_vec3();
    Aabb::new(min, min + Vec3::ONE)
}

/// Cells under the box's bounding range, plus one layer below for shapes
/// that reach above their own cell.
fn overlapping_cells(aabb: &Aabb) -> impl Iterator<Item = IVec3> {
    let min = aabb.min.floor().as_ivec3() - IVec3::Y;
    let max = aabb.max.floor().as_ivec3();
    (min.x..=max.x).flat_map(move |x| {
        (min.y..=max.y).flat_map(move |y| (min.z..=max.z).map(move |z| IVec3::new(x, y, z)))
    })
}

fn shape_overlaps(world: &World, pos: IVec3, aabb: &Aabb) -> bool {
    let offset = pos.as_vec3();
    BlockShape::resolve(world, pos)
        .collision_boxes()
        .iter()
        .any(|part| part.translated(offset).intersects(aabb))
}
