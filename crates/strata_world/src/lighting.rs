//! Block-light flood fill over loaded chunks.
//!
//! Light spreads from emitting blocks through transparent cells, losing one
//! level per hop. There is no sky light.

use std::collections::VecDeque;

use glam::IVec3;
use tracing::trace;

use crate::coords::{chunk_to_world, in_world_height, ChunkPos, WORLD_HEIGHT};
use crate::world::World;

const NEIGHBOR_OFFSETS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

/// Raises light around a newly placed emitter.
pub fn update_lighting(world: &mut World, source: IVec3, level: u8) {
    if world.loaded_block(source).is_none() || !in_world_height(source.y) {
        return;
    }
    if world.get_light(source) < level {
        world.set_light(source, level);
    }

    let mut queue = VecDeque::new();
    queue.push_back((source, level));
    propagate(world, queue);
}

/// Resets light inside a box of half-extent `radius` around `center`, then
/// refloods from every emitter still inside the box.
///
/// Emitters just outside the box are not consulted, so cells near the box
/// edge may end up darker than a full relight would leave them.
pub fn recalc_local_light(world: &mut World, center: IVec3, radius: i32) {
    let min = center - IVec3::splat(radius);
    let max = center + IVec3::splat(radius);
    let min_y = min.y.max(0);
    let max_y = max.y.min(WORLD_HEIGHT as i32 - 1);

    let mut queue = VecDeque::new();
    for x in min.x..=max.x {
        for z in min.z..=max.z {
            for y in min_y..=max_y {
                let pos = IVec3::new(x, y, z);
                let Some(block) = world.loaded_block(pos) else {
                    continue;
                };
                let emission = world.registry().light_level(block);
                world.set_light(pos, emission);
                if emission > 0 {
                    queue.push_back((pos, emission));
                }
            }
        }
    }

    trace!(sources = queue.len(), radius, "local relight");
    propagate(world, queue);
}

/// Clears and relights whole chunks. Emitters in the eight surrounding
/// chunks are included because their light reaches across the border.
pub fn relight_chunks(world: &mut World, chunks: &[ChunkPos]) {
    let mut queue = VecDeque::new();
    let mut seeded = Vec::new();

    for &chunk_pos in chunks {
        world.clear_chunk_light(chunk_pos);
    }

    for &chunk_pos in chunks {
        for dx in -1..=1 {
            for dz in -1..=1 {
                let around = chunk_pos + ChunkPos::new(dx, dz);
                if seeded.contains(&around) {
                    continue;
                }
                seeded.push(around);
                let Some(chunk) = world.get_chunk(around.x, around.z) else {
                    continue;
                };
                for (local, block) in chunk.iter_blocks() {
                    let emission = world.registry().light_level(block);
                    if emission > 0 {
                        queue.push_back((chunk_to_world(around, local), emission));
                    }
                }
            }
        }
    }

    for &(pos, level) in &queue {
        if world.get_light(pos) < level {
            world.set_light(pos, level);
        }
    }
    propagate(world, queue);
}

fn propagate(world: &mut World, mut queue: VecDeque<(IVec3, u8)>) {
    while let Some((pos, level)) = queue.pop_front() {
        if level <= 1 {
            continue;
        }
        let next = level - 1;
        for offset in NEIGHBOR_OFFSETS {
            let neighbor = pos + offset;
            if !in_world_height(neighbor.y) {
                continue;
            }
            let Some(block) = world.loaded_block(neighbor) else {
                continue;
            };
            if !world.registry().get_properties(block).transparent {
                continue;
            }
            if world.get_light(neighbor) < next {
                world.set_light(neighbor, next);
                if next > 1 {
                    queue.push_back((neighbor, next));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::{recalc_local_light, update_lighting};
    use crate::block::BlockId;
    use crate::chunk::Chunk;
    use crate::config::WorldSettings;
    use crate::coords::ChunkPos;
    use crate::world::World;

    fn flat_world() -> World {
        let mut world = World::new(WorldSettings::default());
        for x in -2..=2 {
            for z in -2..=2 {
                world.insert_chunk(Chunk::new(ChunkPos::new(x, z)));
            }
        }
        world
    }

    #[test]
    fn torch_lights_itself_and_neighbors() {
        let mut world = flat_world();
        let torch = IVec3::new(8, 20, 8);
        world.set_block(torch, BlockId::TORCH);

        assert_eq!(world.get_light(torch), 15);
        assert_eq!(world.get_light(torch + IVec3::X), 14);
        assert_eq!(world.get_light(torch + IVec3::NEG_Y), 14);
        assert_eq!(world.get_light(torch + IVec3::new(3, 0, 0)), 12);
    }

    #[test]
    fn light_at_distance_is_at_least_source_minus_distance() {
        let mut world = flat_world();
        let torch = IVec3::new(0, 40, 0);
        world.set_block(torch, BlockId::TORCH);

        for dx in -16i32..=16 {
            for dz in -16i32..=16 {
                let d = dx.abs() + dz.abs();
                let light = world.get_light(torch + IVec3::new(dx, 0, dz));
                if d < 15 {
                    assert!(light >= 15 - d as u8, "d={d} light={light}");
                }
                assert!(light <= 15);
                if d >= 15 {
                    assert_eq!(light, 0, "d={d}");
                }
            }
        }
    }

    #[test]
    fn opaque_blocks_stop_light() {
        let mut world = flat_world();
        let torch = IVec3::new(8, 20, 8);
        for y in 15..26 {
            for z in 3..14 {
                world.set_block(IVec3::new(10, y, z), BlockId::STONE);
            }
        }
        world.set_block(torch, BlockId::TORCH);

        assert_eq!(world.get_light(IVec3::new(9, 20, 8)), 14);
        assert_eq!(world.get_light(IVec3::new(10, 20, 8)), 0);
        // Every path around the wall is 15 hops long.
        assert_eq!(world.get_light(IVec3::new(11, 20, 8)), 0);
    }

    #[test]
    fn removing_the_only_source_returns_the_area_to_darkness() {
        let mut world = flat_world();
        let torch = IVec3::new(3, 30, -4);
        world.set_block(torch, BlockId::TORCH);
        assert_eq!(world.get_light(torch + IVec3::Z), 14);

        world.set_block(torch, BlockId::AIR);
        for dx in -15..=15 {
            for dy in -15..=15 {
                for dz in -15..=15 {
                    let pos = torch + IVec3::new(dx, dy, dz);
                    assert_eq!(world.get_light(pos), 0, "stale light at {pos}");
                }
            }
        }
    }

    #[test]
    fn covering_a_torch_with_stone_darkens_its_surroundings() {
        let mut world = flat_world();
        let torch = IVec3::new(0, 10, 0);
        world.set_block(torch, BlockId::TORCH);
        world.set_block(torch, BlockId::STONE);
        assert_eq!(world.get_light(torch + IVec3::Y), 0);
    }

    #[test]
    fn second_source_survives_relight_of_the_first() {
        let mut world = flat_world();
        let a = IVec3::new(0, 10, 0);
        let b = IVec3::new(4, 10, 0);
        world.set_block(a, BlockId::TORCH);
        world.set_block(b, BlockId::GLOWSTONE);
        world.set_block(a, BlockId::AIR);

        assert_eq!(world.get_light(b), 15);
        assert_eq!(world.get_light(a), 11);
    }

    #[test]
    fn update_and_recalc_ignore_unloaded_space() {
        let mut world = flat_world();
        let far = IVec3::new(500, 10, 500);
        update_lighting(&mut world, far, 15);
        recalc_local_light(&mut world, far, 3);
        assert_eq!(world.get_light(far), 15);
    }
}
