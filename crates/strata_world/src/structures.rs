//! Multi-block features written through the world so they can reach into
//! neighbouring chunks, queued as pending edits when those are not loaded.

use glam::IVec3;

use crate::block::BlockId;
use crate::coords::world_to_chunk;
use crate::metadata::SOURCE_LEVEL;
use crate::world::World;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    OakTree,
    SpruceTree,
    Cactus,
    Well,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureSite {
    pub base: IVec3,
    pub structure: Structure,
    /// Per-site random bits used for sizes.
    pub roll: u64,
}

impl Structure {
    pub fn place(self, world: &mut World, base: IVec3, roll: u64) {
        match self {
            Structure::OakTree => {
                let height = 4 + (roll % 3) as i32;
                place_tree(world, base, height, BlockId::WOOD, BlockId::LEAVES);
            }
            Structure::SpruceTree => {
                let height = 6 + (roll % 4) as i32;
                place_tree(world, base, height, BlockId::SPRUCE_WOOD, BlockId::SPRUCE_LEAVES);
            }
            Structure::Cactus => {
                let height = 2 + (roll % 2) as i32;
                for dy in 0..height {
                    world.place_generated(base + IVec3::new(0, dy, 0), BlockId::CACTUS, 0);
                }
            }
            Structure::Well => place_well(world, base),
        }
    }
}

fn place_tree(world: &mut World, base: IVec3, height: i32, trunk: BlockId, leaves: BlockId) {
    for dy in 0..height {
        world.place_generated(base + IVec3::new(0, dy, 0), trunk, 0);
    }

    let canopy_bottom = height - 2;
    for dx in -2i32..=2 {
        for dz in -2i32..=2 {
            for dy in canopy_bottom..=height + 1 {
                if dx.abs() + dz.abs() + (dy - canopy_bottom) >= 4 {
                    continue;
                }
                world.place_generated_if_air(base + IVec3::new(dx, dy, dz), leaves);
            }
        }
    }
}

/// 3x3 cobblestone rim with corner posts and a roof, over a three-deep shaft
/// of water capped with cobblestone. Parts that land in a neighbouring chunk
/// only fill air there.
fn place_well(world: &mut World, base: IVec3) {
    let home = world_to_chunk(base).0;
    let place = |world: &mut World, pos: IVec3, block: BlockId| {
        if world_to_chunk(pos).0 == home {
            world.place_generated(pos, block, 0);
        } else {
            world.place_generated_if_air(pos, block);
        }
    };

    for dx in -1..=1 {
        for dz in -1..=1 {
            place(world, base + IVec3::new(dx, 0, dz), BlockId::COBBLESTONE);
            place(world, base + IVec3::new(dx, 3, dz), BlockId::COBBLESTONE);
            if dx != 0 && dz != 0 {
                place(world, base + IVec3::new(dx, 1, dz), BlockId::WOOD);
                place(world, base + IVec3::new(dx, 2, dz), BlockId::WOOD);
            }
        }
    }

    for depth in 0..3 {
        world.place_generated(base - IVec3::new(0, depth, 0), BlockId::WATER, SOURCE_LEVEL);
    }
    world.place_generated(base - IVec3::new(0, 3, 0), BlockId::COBBLESTONE, 0);
}
