use glam::IVec3;
use noise::{NoiseFn, Perlin};

use crate::block::BlockId;
use crate::chunk::Chunk;
use crate::coords::{CHUNK_SIZE, WORLD_HEIGHT};
use crate::metadata::SOURCE_LEVEL;
use crate::structures::{Structure, StructureSite};

/// Columns whose surface lies below this are flooded up to it.
pub const WATER_LEVEL: i32 = 16;
/// Surfaces below this are sand rather than grass.
pub const SHORE_LEVEL: i32 = 18;

const BASE_HEIGHT: f64 = 20.0;
const TERRAIN_SCALE: f64 = 0.03;
const TERRAIN_AMPLITUDE: f64 = 10.0;
const DETAIL_SCALE: f64 = 0.1;
const DETAIL_AMPLITUDE: f64 = 2.0;
const CAVE_SCALE: f64 = 0.05;
const CAVE_THRESHOLD: f64 = 0.4;
const CLIMATE_SCALE: f64 = 0.005;
const SUBSURFACE_DEPTH: i32 = 3;

const COAL_CHANCE: f64 = 0.01;
const IRON_CHANCE: f64 = 0.005;
const IRON_MAX_Y: i32 = 20;
const DIAMOND_CHANCE: f64 = 0.002;
const DIAMOND_MAX_Y: i32 = 10;
const FLOWER_CHANCE: f64 = 0.03;

const COAL_SALT: u64 = 11;
const IRON_SALT: u64 = 23;
const DIAMOND_SALT: u64 = 37;
const FLOWER_SALT: u64 = 41;
const TREE_SALT: u64 = 53;
const CACTUS_SALT: u64 = 67;
const WELL_SALT: u64 = 79;
const SHAPE_SALT: u64 = 97;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Biome {
    Ocean,
    Beach,
    Plains,
    Forest,
    Desert,
    Snow,
}

impl Biome {
    pub fn surface_blocks(self) -> (BlockId, BlockId) {
        match self {
            Biome::Ocean | Biome::Beach | Biome::Desert => (BlockId::SAND, BlockId::SAND),
            Biome::Snow => (BlockId::SNOW, BlockId::DIRT),
            Biome::Plains | Biome::Forest => (BlockId::GRASS, BlockId::DIRT),
        }
    }

    /// Structure and per-column chance of placing it on a matching surface.
    fn structure_odds(self) -> &'static [(Structure, f64, u64)] {
        match self {
            Biome::Ocean => &[],
            Biome::Beach => &[(Structure::Cactus, 0.01, CACTUS_SALT)],
            Biome::Plains => &[
                (Structure::Well, 0.002, WELL_SALT),
                (Structure::OakTree, 0.01, TREE_SALT),
            ],
            Biome::Forest => &[(Structure::OakTree, 0.05, TREE_SALT)],
            Biome::Desert => &[(Structure::Cactus, 0.02, CACTUS_SALT)],
            Biome::Snow => &[(Structure::SpruceTree, 0.02, TREE_SALT)],
        }
    }
}

/// Deterministic terrain from a world seed.
#[derive(Clone)]
pub struct TerrainGenerator {
    seed: u64,
    terrain: Perlin,
    detail: Perlin,
    caves: Perlin,
    temperature: Perlin,
    humidity: Perlin,
}

impl TerrainGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            terrain: Perlin::new(seed as u32),
            detail: Perlin::new(seed.wrapping_add(1000) as u32),
            caves: Perlin::new(seed.wrapping_add(2000) as u32),
            temperature: Perlin::new(seed.wrapping_add(3) as u32),
            humidity: Perlin::new(seed.wrapping_add(7) as u32),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Y of the topmost terrain block in a column.
    pub fn surface_height(&self, world_x: i32, world_z: i32) -> i32 {
        let wx = world_x as f64;
        let wz = world_z as f64;
        let base = self.terrain.get([wx * TERRAIN_SCALE, wz * TERRAIN_SCALE]) * TERRAIN_AMPLITUDE;
        let detail = self.detail.get([wx * DETAIL_SCALE, wz * DETAIL_SCALE]) * DETAIL_AMPLITUDE;
        let height = (BASE_HEIGHT + base + detail).floor() as i32;
        height.clamp(1, WORLD_HEIGHT as i32 - 1)
    }

    pub fn biome_at(&self, world_x: i32, world_z: i32) -> Biome {
        self.biome_for_height(world_x, world_z, self.surface_height(world_x, world_z))
    }

    fn biome_for_height(&self, world_x: i32, world_z: i32, height: i32) -> Biome {
        if height < WATER_LEVEL {
            return Biome::Ocean;
        }
        if height < SHORE_LEVEL {
            return Biome::Beach;
        }

        let wx = world_x as f64 * CLIMATE_SCALE;
        let wz = world_z as f64 * CLIMATE_SCALE;
        let temperature = self.temperature.get([wx, wz]);
        let humidity = self.humidity.get([wx + 1000.0, wz + 1000.0]);

        if temperature > 0.5 {
            if humidity < 0.0 {
                Biome::Desert
            } else {
                Biome::Forest
            }
        } else if temperature < -0.3 {
            Biome::Snow
        } else if humidity > 0.2 {
            Biome::Forest
        } else {
            Biome::Plains
        }
    }

    fn is_cave(&self, world_x: i32, world_y: i32, world_z: i32) -> bool {
        let value = self.caves.get([
            world_x as f64 * CAVE_SCALE,
            world_y as f64 * CAVE_SCALE,
            world_z as f64 * CAVE_SCALE,
        ]);
        value > CAVE_THRESHOLD
    }

    fn column_hash(&self, world_x: i32, world_z: i32, salt: u64) -> u64 {
        self.seed
            .wrapping_add(salt)
            .wrapping_mul(6364136223846793005)
            .wrapping_add((world_x as i64 as u64).wrapping_mul(2654435761))
            .wrapping_add((world_z as i64 as u64).wrapping_mul(40503))
    }

    fn cell_hash(&self, world_x: i32, world_y: i32, world_z: i32, salt: u64) -> u64 {
        self.seed
            .wrapping_add(salt)
            .wrapping_mul(6364136223846793005)
            .wrapping_add((world_x as i64 as u64).wrapping_mul(1442695040888963407))
            .wrapping_add((world_y as i64 as u64).wrapping_mul(22695477))
            .wrapping_add((world_z as i64 as u64).wrapping_mul(1103515245))
    }

    fn ore_at(&self, world_x: i32, world_y: i32, world_z: i32) -> Option<BlockId> {
        let roll = |salt| unit_roll(self.cell_hash(world_x, world_y, world_z, salt));

        if roll(COAL_SALT) < COAL_CHANCE {
            Some(BlockId::COAL_ORE)
        } else if world_y < IRON_MAX_Y && roll(IRON_SALT) < IRON_CHANCE {
            Some(BlockId::IRON_ORE)
        } else if world_y < DIAMOND_MAX_Y && roll(DIAMOND_SALT) < DIAMOND_CHANCE {
            Some(BlockId::DIAMOND_ORE)
        } else {
            None
        }
    }

    /// Lays down the base terrain of a chunk: bedrock, stone with caves and
    /// ores, the biome's surface layers, water and flowers.
    pub fn fill_chunk(&self, chunk: &mut Chunk) {
        let origin = chunk.pos().origin();

        for x in 0..CHUNK_SIZE as i32 {
            for z in 0..CHUNK_SIZE as i32 {
                let world_x = origin.x + x;
                let world_z = origin.z + z;
                let height = self.surface_height(world_x, world_z);
                let biome = self.biome_for_height(world_x, world_z, height);

                chunk.set(x, 0, z, BlockId::BEDROCK);

                for y in 1..height {
                    if self.is_cave(world_x, y, world_z) {
                        continue;
                    }
                    let block = self.ore_at(world_x, y, world_z).unwrap_or(BlockId::STONE);
                    chunk.set(x, y, z, block);
                }

                let (top, under) = biome.surface_blocks();
                chunk.set(x, height, z, top);
                for depth in 1..=SUBSURFACE_DEPTH {
                    let y = height - depth;
                    if y > 0 && chunk.get(x, y, z) == BlockId::STONE {
                        chunk.set(x, y, z, under);
                    }
                }

                for y in (height + 1)..=WATER_LEVEL {
                    chunk.set(x, y, z, BlockId::WATER);
                    chunk.set_metadata(x, y, z, SOURCE_LEVEL);
                }

                if top == BlockId::GRASS
                    && unit_roll(self.column_hash(world_x, world_z, FLOWER_SALT)) < FLOWER_CHANCE
                {
                    chunk.set(x, height + 1, z, BlockId::FLOWER);
                }
            }
        }
    }

    /// Structures rooted in this chunk's columns, in column order.
    ///
    /// Only columns whose surface still shows the biome's top block qualify.
    pub fn structure_sites(&self, chunk: &Chunk) -> Vec<StructureSite> {
        let origin = chunk.pos().origin();
        let mut sites = Vec::new();

        for x in 0..CHUNK_SIZE as i32 {
            for z in 0..CHUNK_SIZE as i32 {
                let world_x = origin.x + x;
                let world_z = origin.z + z;
                let height = self.surface_height(world_x, world_z);
                let biome = self.biome_for_height(world_x, world_z, height);
                let (top, _) = biome.surface_blocks();
                if chunk.get(x, height, z) != top || height <= WATER_LEVEL {
                    continue;
                }

                for &(structure, chance, salt) in biome.structure_odds() {
                    if unit_roll(self.column_hash(world_x, world_z, salt)) >= chance {
                        continue;
                    }
                    let base_y = match structure {
                        Structure::Well => height,
                        _ => height + 1,
                    };
                    sites.push(StructureSite {
                        base: IVec3::new(world_x, base_y, world_z),
                        structure,
                        roll: self.column_hash(world_x, world_z, SHAPE_SALT) >> 8,
                    });
                    break;
                }
            }
        }

        sites
    }
}

fn unit_roll(hash: u64) -> f64 {
    ((hash >> 11) & 0xffff) as f64 / 65535.0
}

#[cfg(test)]
mod tests {
    use super::{Biome, TerrainGenerator, WATER_LEVEL};
    use crate::block::BlockId;
    use crate::chunk::Chunk;
    use crate::coords::{ChunkPos, CHUNK_SIZE, WORLD_HEIGHT};

    fn generated(seed: u64, pos: ChunkPos) -> Chunk {
        let generator = TerrainGenerator::new(seed);
        let mut chunk = Chunk::new(pos);
        generator.fill_chunk(&mut chunk);
        chunk
    }

    #[test]
    fn same_seed_generates_identical_chunks() {
        let a = generated(777, ChunkPos::new(3, -2));
        let b = generated(777, ChunkPos::new(3, -2));
        assert_eq!(a.block_bytes(), b.block_bytes());
        assert_eq!(a.metadata_bytes(), b.metadata_bytes());
    }

    #[test]
    fn columns_have_bedrock_floor_and_surface_at_height() {
        let generator = TerrainGenerator::new(2024);
        let chunk = generated(2024, ChunkPos::new(0, 0));

        for x in 0..CHUNK_SIZE as i32 {
            for z in 0..CHUNK_SIZE as i32 {
                assert_eq!(chunk.get(x, 0, z), BlockId::BEDROCK);

                let height = generator.surface_height(x, z);
                assert!((8..=32).contains(&height), "height {height}");
                let (top, _) = generator.biome_at(x, z).surface_blocks();
                assert_eq!(chunk.get(x, height, z), top);

                for y in (height + 1)..=WATER_LEVEL {
                    assert_eq!(chunk.get(x, y, z), BlockId::WATER);
                    assert_eq!(chunk.get_metadata(x, y, z), 8);
                }
                let above = chunk.get(x, height.max(WATER_LEVEL) + 1, z);
                assert!(above == BlockId::AIR || above == BlockId::FLOWER);
            }
        }
    }

    #[test]
    fn low_columns_are_ocean_or_beach() {
        let generator = TerrainGenerator::new(31);
        for x in -200..200 {
            let height = generator.surface_height(x, 5);
            let biome = generator.biome_at(x, 5);
            if height < WATER_LEVEL {
                assert_eq!(biome, Biome::Ocean);
            } else if height < super::SHORE_LEVEL {
                assert_eq!(biome, Biome::Beach);
            } else {
                assert!(!matches!(biome, Biome::Ocean | Biome::Beach));
            }
        }
    }

    #[test]
    fn ores_respect_depth_limits() {
        let generator = TerrainGenerator::new(8);
        let mut coal = 0;
        for chunk_x in -2..2 {
            let chunk = generated(8, ChunkPos::new(chunk_x, 0));
            for x in 0..CHUNK_SIZE as i32 {
                for z in 0..CHUNK_SIZE as i32 {
                    for y in 0..WORLD_HEIGHT as i32 {
                        match chunk.get(x, y, z) {
                            BlockId::IRON_ORE => assert!(y < 20),
                            BlockId::DIAMOND_ORE => assert!(y < 10),
                            BlockId::COAL_ORE => coal += 1,
                            _ => {}
                        }
                    }
                }
            }
        }
        assert!(coal > 0);
        assert_eq!(generator.seed(), 8);
    }

    #[test]
    fn structure_sites_sit_on_land_above_water() {
        let generator = TerrainGenerator::new(4242);
        let mut total = 0;
        for chunk_x in -4..4 {
            for chunk_z in -4..4 {
                let chunk = generated(4242, ChunkPos::new(chunk_x, chunk_z));
                for site in generator.structure_sites(&chunk) {
                    total += 1;
                    let height = generator.surface_height(site.base.x, site.base.z);
                    assert!(height > WATER_LEVEL);
                    assert!(site.base.y == height || site.base.y == height + 1);
                }
            }
        }
        assert!(total > 0, "expected at least one structure in 64 chunks");
    }
}
