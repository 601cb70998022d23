use glam::IVec3;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{register_default_blocks, BlockId, BlockRegistry};
use crate::chunk::{Chunk, MAX_LIGHT};
use crate::config::WorldSettings;
use crate::coords::{
    chunk_to_world, in_world_height, world_to_chunk, ChunkPos, LocalPos, CHUNK_SIZE, WORLD_HEIGHT,
};
use crate::fluid::{self, FluidChange};
use crate::lighting;
use crate::metadata::SOURCE_LEVEL;
use crate::worldgen::TerrainGenerator;

/// Light reported for positions outside loaded space.
pub const UNLOADED_LIGHT: u8 = MAX_LIGHT;

const FACE_OFFSETS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

/// A write queued for a chunk that has not been generated yet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub local: LocalPos,
    pub block: BlockId,
    pub metadata: u8,
    /// Applied only if the cell is still air once the chunk is loaded.
    pub only_into_air: bool,
}

/// Opaque per-position state owned by stateful-block subsystems.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntity {
    pub kind: String,
    pub data: Vec<u8>,
}

impl BlockEntity {
    pub fn new(kind: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn from_value<T: Serialize>(kind: impl Into<String>, value: &T) -> bincode::Result<Self> {
        Ok(Self::new(kind, bincode::serialize(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> bincode::Result<T> {
        bincode::deserialize(&self.data)
    }
}

pub struct World {
    settings: WorldSettings,
    registry: BlockRegistry,
    generator: TerrainGenerator,
    chunks: FxHashMap<ChunkPos, Chunk>,
    pending: FxHashMap<ChunkPos, Vec<PendingEdit>>,
    block_entities: FxHashMap<IVec3, BlockEntity>,
    pub(crate) active_fluids: FxHashSet<IVec3>,
    relight_queue: FxHashSet<ChunkPos>,
}

impl World {
    pub fn new(settings: WorldSettings) -> Self {
        Self::with_registry(settings, register_default_blocks())
    }

    pub fn with_registry(settings: WorldSettings, registry: BlockRegistry) -> Self {
        let generator = TerrainGenerator::new(settings.seed);
        Self {
            settings,
            registry,
            generator,
            chunks: FxHashMap::default(),
            pending: FxHashMap::default(),
            block_entities: FxHashMap::default(),
            active_fluids: FxHashSet::default(),
            relight_queue: FxHashSet::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.settings.seed
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.generator
    }

    pub fn get_block(&self, pos: IVec3) -> BlockId {
        self.loaded_block(pos).unwrap_or(BlockId::AIR)
    }

    /// `None` when the containing chunk is not loaded.
    pub fn loaded_block(&self, pos: IVec3) -> Option<BlockId> {
        let (chunk_pos, local) = world_to_chunk(pos);
        self.chunks
            .get(&chunk_pos)
            .map(|chunk| chunk.get(local.x, local.y, local.z))
    }

    pub fn get_metadata(&self, pos: IVec3) -> u8 {
        let (chunk_pos, local) = world_to_chunk(pos);
        self.chunks
            .get(&chunk_pos)
            .map_or(0, |chunk| chunk.get_metadata(local.x, local.y, local.z))
    }

    pub fn get_light(&self, pos: IVec3) -> u8 {
        let (chunk_pos, local) = world_to_chunk(pos);
        self.chunks
            .get(&chunk_pos)
            .map_or(UNLOADED_LIGHT, |chunk| chunk.get_light(local.x, local.y, local.z))
    }

    /// Writes light into a loaded cell. Returns `false` when nothing was written.
    pub(crate) fn set_light(&mut self, pos: IVec3, level: u8) -> bool {
        if !in_world_height(pos.y) {
            return false;
        }
        let (chunk_pos, local) = world_to_chunk(pos);
        match self.chunks.get_mut(&chunk_pos) {
            Some(chunk) => {
                chunk.set_light(local.x, local.y, local.z, level);
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_chunk_light(&mut self, chunk_pos: ChunkPos) {
        if let Some(chunk) = self.chunks.get_mut(&chunk_pos) {
            chunk.clear_light();
        }
    }

    /// Places a block with default metadata. Fluids are placed as sources.
    pub fn set_block(&mut self, pos: IVec3, block: BlockId) {
        let metadata = if self.registry.is_fluid(block) {
            SOURCE_LEVEL
        } else {
            0
        };
        self.set_block_with_metadata(pos, block, metadata);
    }

    /// Writes through to a loaded chunk, relighting and waking nearby fluid.
    /// Writes into unloaded chunks are queued until that chunk is generated.
    pub fn set_block_with_metadata(&mut self, pos: IVec3, block: BlockId, metadata: u8) {
        if !in_world_height(pos.y) {
            return;
        }
        let (chunk_pos, local) = world_to_chunk(pos);
        let Some(chunk) = self.chunks.get_mut(&chunk_pos) else {
            self.queue_pending(chunk_pos, local, block, metadata, false);
            return;
        };

        let old = chunk.get(local.x, local.y, local.z);
        chunk.set(local.x, local.y, local.z, block);
        chunk.set_metadata(local.x, local.y, local.z, metadata);
        self.mark_edge_neighbors_dirty(chunk_pos, local);

        self.relight_after_change(pos, old, block);
        self.schedule_fluid_neighborhood(pos);
    }

    /// Updates metadata of a loaded, non-air block. Unloaded space is ignored.
    pub fn set_metadata(&mut self, pos: IVec3, metadata: u8) {
        let (chunk_pos, local) = world_to_chunk(pos);
        let Some(chunk) = self.chunks.get_mut(&chunk_pos) else {
            return;
        };
        chunk.set_metadata(local.x, local.y, local.z, metadata);
        self.mark_edge_neighbors_dirty(chunk_pos, local);
        self.schedule_fluid_neighborhood(pos);
    }

    fn relight_after_change(&mut self, pos: IVec3, old: BlockId, new: BlockId) {
        let old_props = self.registry.get_properties(old);
        let new_props = self.registry.get_properties(new);
        let needs_local_recalc =
            old_props.emits_light() || old_props.is_opaque() || new_props.is_opaque();
        let new_light = new_props.light_level;
        let radius = self.settings.relight_radius;

        if needs_local_recalc {
            lighting::recalc_local_light(self, pos, radius);
        } else if new_light > 0 {
            lighting::update_lighting(self, pos, new_light);
        }
    }

    fn queue_pending(
        &mut self,
        chunk_pos: ChunkPos,
        local: IVec3,
        block: BlockId,
        metadata: u8,
        only_into_air: bool,
    ) {
        let Some(local) = LocalPos::from_i32(local.x, local.y, local.z) else {
            return;
        };
        self.pending.entry(chunk_pos).or_default().push(PendingEdit {
            local,
            block,
            metadata,
            only_into_air,
        });
    }

    fn mark_edge_neighbors_dirty(&mut self, chunk_pos: ChunkPos, local: IVec3) {
        let max = CHUNK_SIZE as i32 - 1;
        let mut neighbors = Vec::with_capacity(2);
        if local.x == 0 {
            neighbors.push(ChunkPos::new(chunk_pos.x - 1, chunk_pos.z));
        } else if local.x == max {
            neighbors.push(ChunkPos::new(chunk_pos.x + 1, chunk_pos.z));
        }
        if local.z == 0 {
            neighbors.push(ChunkPos::new(chunk_pos.x, chunk_pos.z - 1));
        } else if local.z == max {
            neighbors.push(ChunkPos::new(chunk_pos.x, chunk_pos.z + 1));
        }

        for neighbor in neighbors {
            if let Some(chunk) = self.chunks.get_mut(&neighbor) {
                chunk.mark_dirty();
            }
        }
    }

    /// Marks every fluid cell at or next to `pos` for the next fluid tick.
    pub fn schedule_fluid_neighborhood(&mut self, pos: IVec3) {
        for candidate in std::iter::once(pos).chain(FACE_OFFSETS.iter().map(|o| pos + *o)) {
            if let Some(block) = self.loaded_block(candidate) {
                if self.registry.is_fluid(block) {
                    self.active_fluids.insert(candidate);
                }
            }
        }
    }

    /// Write path used while generating terrain features. Skips per-block
    /// relighting; touched loaded chunks are relit once generation finishes.
    pub(crate) fn place_generated(&mut self, pos: IVec3, block: BlockId, metadata: u8) {
        if !in_world_height(pos.y) {
            return;
        }
        let (chunk_pos, local) = world_to_chunk(pos);
        match self.chunks.get_mut(&chunk_pos) {
            Some(chunk) => {
                chunk.set(local.x, local.y, local.z, block);
                chunk.set_metadata(local.x, local.y, local.z, metadata);
                self.mark_edge_neighbors_dirty(chunk_pos, local);
                self.relight_queue.insert(chunk_pos);
            }
            None => self.queue_pending(chunk_pos, local, block, metadata, false),
        }
    }

    /// Like [`World::place_generated`] but never replaces a non-air cell,
    /// including cells of chunks that are only generated later.
    pub(crate) fn place_generated_if_air(&mut self, pos: IVec3, block: BlockId) {
        if !in_world_height(pos.y) {
            return;
        }
        match self.loaded_block(pos) {
            Some(existing) if existing.is_air() => self.place_generated(pos, block, 0),
            Some(_) => {}
            None => {
                let (chunk_pos, local) = world_to_chunk(pos);
                self.queue_pending(chunk_pos, local, block, 0, true);
            }
        }
    }

    /// Idempotent: an already-loaded coordinate is left untouched.
    pub fn generate_chunk(&mut self, chunk_x: i32, chunk_z: i32) {
        let chunk_pos = ChunkPos::new(chunk_x, chunk_z);
        if self.chunks.contains_key(&chunk_pos) {
            return;
        }

        let mut chunk = Chunk::new(chunk_pos);
        self.generator.fill_chunk(&mut chunk);
        let sites = self.generator.structure_sites(&chunk);
        self.chunks.insert(chunk_pos, chunk);

        for site in sites {
            site.structure.place(self, site.base, site.roll);
        }

        self.finish_load(chunk_pos);
        debug!(x = chunk_x, z = chunk_z, "generated chunk");
    }

    /// Registers a chunk restored from storage. Returns `false` if the
    /// coordinate is already loaded.
    pub fn insert_chunk(&mut self, chunk: Chunk) -> bool {
        let chunk_pos = chunk.pos();
        if self.chunks.contains_key(&chunk_pos) {
            return false;
        }
        self.chunks.insert(chunk_pos, chunk);
        self.finish_load(chunk_pos);
        debug!(x = chunk_pos.x, z = chunk_pos.z, "inserted chunk");
        true
    }

    fn finish_load(&mut self, chunk_pos: ChunkPos) {
        self.replay_pending(chunk_pos);
        self.relight_queue.insert(chunk_pos);

        let touched: Vec<ChunkPos> = self.relight_queue.drain().collect();
        lighting::relight_chunks(self, &touched);

        for offset in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
            let neighbor = chunk_pos + ChunkPos::new(offset.0, offset.1);
            if let Some(chunk) = self.chunks.get_mut(&neighbor) {
                chunk.mark_dirty();
            }
        }
        self.wake_border_fluids(chunk_pos);
    }

    /// Schedules fluid on either side of a freshly loaded chunk's edges so
    /// neighbouring water can flow into it.
    fn wake_border_fluids(&mut self, chunk_pos: ChunkPos) {
        let origin = chunk_pos.origin();
        let max = CHUNK_SIZE as i32 - 1;
        for a in 0..CHUNK_SIZE as i32 {
            for (x, z) in [(0, a), (max, a), (a, 0), (a, max)] {
                for y in 0..WORLD_HEIGHT as i32 {
                    self.schedule_fluid_neighborhood(origin + IVec3::new(x, y, z));
                }
            }
        }
    }

    fn replay_pending(&mut self, chunk_pos: ChunkPos) {
        let Some(edits) = self.pending.remove(&chunk_pos) else {
            return;
        };
        debug!(
            x = chunk_pos.x,
            z = chunk_pos.z,
            edits = edits.len(),
            "replaying pending edits"
        );
        for edit in edits {
            let pos = chunk_to_world(chunk_pos, edit.local);
            if edit.only_into_air && !self.get_block(pos).is_air() {
                continue;
            }
            self.place_generated(pos, edit.block, edit.metadata);
            if self.registry.is_fluid(edit.block) {
                self.active_fluids.insert(pos);
            }
        }
    }

    /// Drops a chunk and the fluid work scheduled inside it.
    pub fn remove_chunk(&mut self, chunk_pos: ChunkPos) -> Option<Chunk> {
        let chunk = self.chunks.remove(&chunk_pos)?;
        self.active_fluids
            .retain(|pos| world_to_chunk(*pos).0 != chunk_pos);
        Some(chunk)
    }

    /// Evicts every chunk farther than `radius + unload_buffer` chunks
    /// (Chebyshev) from the chunk containing the world column
    /// `(center_x, center_z)`. Pending edits that far away are discarded.
    /// Returns the evicted chunks so callers can persist them.
    pub fn unload_far_chunks(&mut self, center_x: i32, center_z: i32, radius: i32) -> Vec<Chunk> {
        let center = ChunkPos::containing(center_x, center_z);
        let limit = radius + self.settings.unload_buffer;

        let mut far: Vec<ChunkPos> = self
            .chunks
            .keys()
            .filter(|pos| pos.chebyshev_distance(center) > limit)
            .copied()
            .collect();
        far.sort_by_key(|pos| (pos.x, pos.z));

        let evicted: Vec<Chunk> = far
            .into_iter()
            .filter_map(|pos| self.remove_chunk(pos))
            .collect();

        let pending_before = self.pending.len();
        self.pending
            .retain(|pos, _| pos.chebyshev_distance(center) <= limit);

        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                dropped_pending = pending_before - self.pending.len(),
                "unloaded far chunks"
            );
        }
        evicted
    }

    /// Highest non-air y in the column, or 0 if the column is empty or unloaded.
    pub fn highest_block_y(&self, x: i32, z: i32) -> i32 {
        (0..WORLD_HEIGHT as i32)
            .rev()
            .find(|&y| !self.get_block(IVec3::new(x, y, z)).is_air())
            .unwrap_or(0)
    }

    pub fn get_chunk(&self, chunk_x: i32, chunk_z: i32) -> Option<&Chunk> {
        self.chunks.get(&ChunkPos::new(chunk_x, chunk_z))
    }

    pub fn get_chunk_at(&self, world_x: i32, world_z: i32) -> Option<&Chunk> {
        self.chunks.get(&ChunkPos::containing(world_x, world_z))
    }

    pub fn is_chunk_loaded(&self, chunk_pos: ChunkPos) -> bool {
        self.chunks.contains_key(&chunk_pos)
    }

    pub fn loaded_chunk_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.keys().copied().collect();
        positions.sort_by_key(|pos| (pos.x, pos.z));
        positions
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Loaded chunks with edits not yet persisted.
    pub fn modified_chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values().filter(|chunk| chunk.is_modified())
    }

    pub fn mark_chunk_saved(&mut self, chunk_pos: ChunkPos) {
        if let Some(chunk) = self.chunks.get_mut(&chunk_pos) {
            chunk.mark_saved();
        }
    }

    /// Recomputes the visible-block cache of a loaded chunk.
    pub fn refresh_visibility(&mut self, chunk_pos: ChunkPos) -> Option<usize> {
        let chunk = self.chunks.get_mut(&chunk_pos)?;
        Some(chunk.refresh_visibility(&self.registry).len())
    }

    pub fn pending_edit_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn get_block_entity(&self, pos: IVec3) -> Option<&BlockEntity> {
        self.block_entities.get(&pos)
    }

    pub fn get_block_entity_mut(&mut self, pos: IVec3) -> Option<&mut BlockEntity> {
        self.block_entities.get_mut(&pos)
    }

    /// `None` deletes the entry. Returns the previous value.
    pub fn set_block_entity(
        &mut self,
        pos: IVec3,
        entity: Option<BlockEntity>,
    ) -> Option<BlockEntity> {
        match entity {
            Some(entity) => self.block_entities.insert(pos, entity),
            None => self.block_entities.remove(&pos),
        }
    }

    pub fn block_entities(&self) -> impl Iterator<Item = (&IVec3, &BlockEntity)> {
        self.block_entities.iter()
    }

    pub fn active_fluid_count(&self) -> usize {
        self.active_fluids.len()
    }

    /// Runs one fluid step over the active set.
    pub fn tick_fluids(&mut self) -> Vec<FluidChange> {
        fluid::tick(self)
    }
}
