use std::ops::{Add, AddAssign, Sub, SubAssign};

use glam::IVec3;
use serde::{Deserialize, Serialize};

pub const CHUNK_SIZE: usize = 16;
pub const WORLD_HEIGHT: usize = 128;
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * WORLD_HEIGHT;

const CHUNK_SIZE_I32: i32 = CHUNK_SIZE as i32;
const WORLD_HEIGHT_I32: i32 = WORLD_HEIGHT as i32;

/// Horizontal chunk coordinate. Chunks span the full world height, so there is no `y`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalPos {
    pub x: u8,
    pub y: u8,
    pub z: u8,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given world column.
    pub fn containing(world_x: i32, world_z: i32) -> Self {
        Self {
            x: chunk_coord(world_x),
            z: chunk_coord(world_z),
        }
    }

    pub fn chebyshev_distance(self, other: ChunkPos) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// World-space position of local (0, 0, 0).
    pub fn origin(self) -> IVec3 {
        IVec3::new(self.x * CHUNK_SIZE_I32, 0, self.z * CHUNK_SIZE_I32)
    }
}

impl LocalPos {
    /// Returns `None` when any component falls outside the chunk volume.
    pub fn from_i32(x: i32, y: i32, z: i32) -> Option<Self> {
        if in_local_bounds(x, y, z) {
            Some(Self {
                x: x as u8,
                y: y as u8,
                z: z as u8,
            })
        } else {
            None
        }
    }

    pub fn as_ivec3(self) -> IVec3 {
        IVec3::new(i32::from(self.x), i32::from(self.y), i32::from(self.z))
    }

    pub fn is_on_chunk_edge(self) -> bool {
        let max = (CHUNK_SIZE - 1) as u8;
        self.x == 0 || self.x == max || self.z == 0 || self.z == max
    }
}

impl Add for ChunkPos {
    type Output = ChunkPos;

    fn add(self, rhs: Self) -> Self::Output {
        ChunkPos {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl AddAssign for ChunkPos {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl Sub for ChunkPos {
    type Output = ChunkPos;

    fn sub(self, rhs: Self) -> Self::Output {
        ChunkPos {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl SubAssign for ChunkPos {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.z -= rhs.z;
    }
}

fn div_rem_floor(value: i32, divisor: i32) -> (i32, i32) {
    let mut q = value / divisor;
    let mut r = value % divisor;
    if r < 0 {
        q -= 1;
        r += divisor;
    }
    (q, r)
}

/// `floor(value / CHUNK_SIZE)`.
pub fn chunk_coord(value: i32) -> i32 {
    div_rem_floor(value, CHUNK_SIZE_I32).0
}

/// Always in `[0, CHUNK_SIZE)`, including for negative inputs.
pub fn local_coord(value: i32) -> i32 {
    div_rem_floor(value, CHUNK_SIZE_I32).1
}

/// Splits a world position into its chunk and the chunk-local coordinate.
///
/// The local `y` is passed through untouched; whether it lies inside
/// `[0, WORLD_HEIGHT)` is for the chunk to decide.
pub fn world_to_chunk(world_pos: IVec3) -> (ChunkPos, IVec3) {
    let (chunk_x, local_x) = div_rem_floor(world_pos.x, CHUNK_SIZE_I32);
    let (chunk_z, local_z) = div_rem_floor(world_pos.z, CHUNK_SIZE_I32);

    (
        ChunkPos {
            x: chunk_x,
            z: chunk_z,
        },
        IVec3::new(local_x, world_pos.y, local_z),
    )
}

pub fn chunk_to_world(chunk_pos: ChunkPos, local: LocalPos) -> IVec3 {
    chunk_pos.origin() + local.as_ivec3()
}

pub fn in_local_bounds(x: i32, y: i32, z: i32) -> bool {
    (0..CHUNK_SIZE_I32).contains(&x)
        && (0..CHUNK_SIZE_I32).contains(&z)
        && (0..WORLD_HEIGHT_I32).contains(&y)
}

pub fn in_world_height(y: i32) -> bool {
    (0..WORLD_HEIGHT_I32).contains(&y)
}

pub fn local_to_index(local: LocalPos) -> usize {
    usize::from(local.x)
        + usize::from(local.z) * CHUNK_SIZE
        + usize::from(local.y) * CHUNK_SIZE * CHUNK_SIZE
}

pub fn index_to_local(index: usize) -> LocalPos {
    assert!(index < CHUNK_VOLUME, "chunk index out of bounds: {index}");

    let y = index / (CHUNK_SIZE * CHUNK_SIZE);
    let rem = index % (CHUNK_SIZE * CHUNK_SIZE);
    let z = rem / CHUNK_SIZE;
    let x = rem % CHUNK_SIZE;

    LocalPos {
        x: x as u8,
        y: y as u8,
        z: z as u8,
    }
}
