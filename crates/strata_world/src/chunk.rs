use crate::block::{BlockId, BlockRegistry};
use crate::coords::{index_to_local, local_to_index, ChunkPos, LocalPos, CHUNK_VOLUME};

pub const MAX_LIGHT: u8 = 15;

const FACE_OFFSETS: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Dense column of blocks with parallel metadata and light grids.
///
/// Out-of-range reads return air, metadata 0 and full light; out-of-range
/// writes are ignored. Routing across chunks is the world's job.
#[derive(Clone, Debug)]
pub struct Chunk {
    pos: ChunkPos,
    blocks: Box<[BlockId]>,
    metadata: Box<[u8]>,
    light: Box<[u8]>,
    dirty: bool,
    modified: bool,
    visible: Vec<LocalPos>,
}

impl Chunk {
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            blocks: vec![BlockId::AIR; CHUNK_VOLUME].into_boxed_slice(),
            metadata: vec![0; CHUNK_VOLUME].into_boxed_slice(),
            light: vec![0; CHUNK_VOLUME].into_boxed_slice(),
            dirty: true,
            modified: false,
            visible: Vec::new(),
        }
    }

    /// Rebuilds a chunk from persisted raw bytes. Returns `None` when a grid
    /// has the wrong length. Metadata on air cells is dropped.
    pub fn from_saved(pos: ChunkPos, blocks: &[u8], metadata: Option<&[u8]>) -> Option<Self> {
        if blocks.len() != CHUNK_VOLUME {
            return None;
        }
        if metadata.is_some_and(|m| m.len() != CHUNK_VOLUME) {
            return None;
        }

        let mut chunk = Self::new(pos);
        chunk
            .blocks
            .copy_from_slice(bytemuck::cast_slice::<u8, BlockId>(blocks));
        if let Some(metadata) = metadata {
            for (index, meta) in metadata.iter().enumerate() {
                if !chunk.blocks[index].is_air() {
                    chunk.metadata[index] = *meta;
                }
            }
        }
        Some(chunk)
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        LocalPos::from_i32(x, y, z).map(local_to_index)
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> BlockId {
        Self::index(x, y, z).map_or(BlockId::AIR, |i| self.blocks[i])
    }

    /// Overwrites the block and clears its metadata.
    pub fn set(&mut self, x: i32, y: i32, z: i32, block: BlockId) {
        let Some(index) = Self::index(x, y, z) else {
            return;
        };
        self.blocks[index] = block;
        self.metadata[index] = 0;
        self.dirty = true;
        self.modified = true;
    }

    pub fn get_metadata(&self, x: i32, y: i32, z: i32) -> u8 {
        Self::index(x, y, z).map_or(0, |i| self.metadata[i])
    }

    /// Ignored on air cells so that air never carries metadata.
    pub fn set_metadata(&mut self, x: i32, y: i32, z: i32, metadata: u8) {
        let Some(index) = Self::index(x, y, z) else {
            return;
        };
        if self.blocks[index].is_air() || self.metadata[index] == metadata {
            return;
        }
        self.metadata[index] = metadata;
        self.dirty = true;
        self.modified = true;
    }

    pub fn get_light(&self, x: i32, y: i32, z: i32) -> u8 {
        Self::index(x, y, z).map_or(MAX_LIGHT, |i| self.light[i])
    }

    pub fn set_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        if let Some(index) = Self::index(x, y, z) {
            self.light[index] = level.min(MAX_LIGHT);
        }
    }

    pub fn clear_light(&mut self) {
        self.light.fill(0);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// True when blocks changed since the last [`Chunk::mark_saved`].
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn mark_saved(&mut self) {
        self.modified = false;
    }

    /// Recomputes the visible-block list if the chunk is dirty.
    ///
    /// A block is visible when any face touches air or a transparent block.
    /// Neighbours outside this chunk count as exposed.
    pub fn refresh_visibility(&mut self, registry: &BlockRegistry) -> &[LocalPos] {
        if self.dirty {
            self.visible.clear();
            for index in 0..CHUNK_VOLUME {
                let block = self.blocks[index];
                if block.is_air() {
                    continue;
                }
                let local = index_to_local(index).as_ivec3();
                let exposed = FACE_OFFSETS.iter().any(|&(dx, dy, dz)| {
                    match Self::index(local.x + dx, local.y + dy, local.z + dz) {
                        Some(n) => {
                            let neighbor = self.blocks[n];
                            neighbor.is_air() || registry.get_properties(neighbor).transparent
                        }
                        None => true,
                    }
                });
                if exposed {
                    self.visible.push(index_to_local(index));
                }
            }
            self.dirty = false;
        }
        &self.visible
    }

    /// Last computed visible-block list; may be stale while dirty.
    pub fn visible_blocks(&self) -> &[LocalPos] {
        &self.visible
    }

    /// Non-air blocks with their local position.
    pub fn iter_blocks(&self) -> impl Iterator<Item = (LocalPos, BlockId)> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| !block.is_air())
            .map(|(index, block)| (index_to_local(index), *block))
    }

    pub fn block_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.blocks)
    }

    pub fn metadata_bytes(&self) -> &[u8] {
        &self.metadata
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|block| block.is_air())
    }
}

#[cfg(test)]
mod tests {
    use super::{Chunk, MAX_LIGHT};
    use crate::block::{register_default_blocks, BlockId};
    use crate::coords::{ChunkPos, LocalPos, CHUNK_SIZE, CHUNK_VOLUME, WORLD_HEIGHT};

    #[test]
    fn chunk_creation_and_get_set_work() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        assert_eq!(chunk.get(3, 7, 11), BlockId::AIR);

        chunk.set(3, 7, 11, BlockId::STONE);
        assert_eq!(chunk.get(3, 7, 11), BlockId::STONE);
        assert!(chunk.is_modified());
        assert!(!chunk.is_empty());
    }

    #[test]
    fn out_of_bounds_access_returns_sentinels() {
        let mut chunk = Chunk::new(ChunkPos::new(2, -1));
        chunk.set(-1, 0, 0, BlockId::STONE);
        chunk.set(0, WORLD_HEIGHT as i32, 0, BlockId::STONE);
        chunk.set(0, 0, CHUNK_SIZE as i32, BlockId::STONE);
        assert!(chunk.is_empty());

        assert_eq!(chunk.get(16, 0, 0), BlockId::AIR);
        assert_eq!(chunk.get_metadata(0, -1, 0), 0);
        assert_eq!(chunk.get_light(0, 500, 0), MAX_LIGHT);
    }

    #[test]
    fn set_resets_metadata_and_air_never_keeps_it() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_metadata(1, 1, 1, 3);
        assert_eq!(chunk.get_metadata(1, 1, 1), 0);

        chunk.set(1, 1, 1, BlockId::WOODEN_STAIRS);
        chunk.set_metadata(1, 1, 1, 3);
        assert_eq!(chunk.get_metadata(1, 1, 1), 3);

        chunk.set(1, 1, 1, BlockId::STONE);
        assert_eq!(chunk.get_metadata(1, 1, 1), 0);
    }

    #[test]
    fn light_is_clamped_to_max() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_light(4, 4, 4, 40);
        assert_eq!(chunk.get_light(4, 4, 4), MAX_LIGHT);
        chunk.clear_light();
        assert_eq!(chunk.get_light(4, 4, 4), 0);
    }

    #[test]
    fn visibility_skips_fully_enclosed_blocks() {
        let registry = register_default_blocks();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        for x in 4..7 {
            for y in 4..7 {
                for z in 4..7 {
                    chunk.set(x, y, z, BlockId::STONE);
                }
            }
        }

        let visible = chunk.refresh_visibility(&registry).to_vec();
        assert_eq!(visible.len(), 26);
        assert!(!visible.contains(&LocalPos { x: 5, y: 5, z: 5 }));
        assert!(!chunk.is_dirty());

        chunk.set(5, 6, 5, BlockId::GLASS);
        assert!(chunk.is_dirty());
        let visible = chunk.refresh_visibility(&registry);
        assert!(visible.contains(&LocalPos { x: 5, y: 5, z: 5 }));
    }

    #[test]
    fn blocks_on_the_chunk_border_count_as_exposed() {
        let registry = register_default_blocks();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        for x in 0..3 {
            for y in 0..3 {
                for z in 0..3 {
                    chunk.set(x, y, z, BlockId::STONE);
                }
            }
        }
        let visible = chunk.refresh_visibility(&registry);
        assert!(visible.contains(&LocalPos { x: 0, y: 1, z: 1 }));
        assert!(!visible.contains(&LocalPos { x: 1, y: 1, z: 1 }));
    }

    #[test]
    fn saved_bytes_rebuild_the_chunk() {
        let mut original = Chunk::new(ChunkPos::new(-3, 9));
        original.set(0, 0, 0, BlockId::BEDROCK);
        original.set(15, 127, 15, BlockId::GLASS);
        original.set(5, 13, 7, BlockId::FENCE_GATE);
        original.set_metadata(5, 13, 7, 6);

        assert_eq!(original.block_bytes().len(), CHUNK_VOLUME);
        let restored = Chunk::from_saved(
            original.pos(),
            original.block_bytes(),
            Some(original.metadata_bytes()),
        )
        .expect("restore chunk");

        assert_eq!(restored.get(0, 0, 0), BlockId::BEDROCK);
        assert_eq!(restored.get(15, 127, 15), BlockId::GLASS);
        assert_eq!(restored.get_metadata(5, 13, 7), 6);
        assert!(!restored.is_modified());

        let blocks_only =
            Chunk::from_saved(original.pos(), original.block_bytes(), None).expect("restore");
        assert_eq!(blocks_only.get_metadata(5, 13, 7), 0);
        assert!(Chunk::from_saved(original.pos(), &[0u8; 12], None).is_none());
    }

    #[test]
    fn iter_blocks_lists_only_non_air() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set(2, 3, 4, BlockId::TORCH);
        let blocks: Vec<_> = chunk.iter_blocks().collect();
        assert_eq!(blocks, vec![(LocalPos { x: 2, y: 3, z: 4 }, BlockId::TORCH)]);
    }
}
