use std::collections::HashMap;
use std::fs;
use std::io;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use strata_world::chunk::Chunk;
use strata_world::coords::ChunkPos;

use crate::compression::{
    compress_lz4, compress_zstd, decompress_lz4, decompress_zstd, REGION_ZSTD_LEVEL,
};
use crate::versioning::{migrate_region_payload, RegionPayload, CURRENT_REGION_FORMAT_VERSION};

/// Chunks per region side.
pub const REGION_SIZE: i32 = 16;

/// Region containing a chunk.
pub fn region_coords(pos: ChunkPos) -> (i32, i32) {
    (pos.x.div_euclid(REGION_SIZE), pos.z.div_euclid(REGION_SIZE))
}

pub fn region_file_name(region_x: i32, region_z: i32) -> String {
    format!("r.{region_x}.{region_z}.strr")
}

/// A chunk as stored on disk: its coordinate and the raw block and metadata
/// grids. Light is recomputed on load. An empty metadata grid means every
/// cell is zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedChunk {
    pub pos: ChunkPos,
    pub blocks: Vec<u8>,
    pub metadata: Vec<u8>,
}

impl SavedChunk {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        let metadata = chunk.metadata_bytes();
        Self {
            pos: chunk.pos(),
            blocks: chunk.block_bytes().to_vec(),
            metadata: if metadata.iter().all(|&m| m == 0) {
                Vec::new()
            } else {
                metadata.to_vec()
            },
        }
    }

    pub fn to_chunk(&self) -> io::Result<Chunk> {
        let metadata = (!self.metadata.is_empty()).then_some(self.metadata.as_slice());
        Chunk::from_saved(self.pos, &self.blocks, metadata).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "chunk {:?} has {} block bytes and {} metadata bytes",
                    self.pos,
                    self.blocks.len(),
                    self.metadata.len()
                ),
            )
        })
    }

    /// Compact in-memory copy for chunks that could not be written yet.
    pub fn encode_snapshot(&self) -> io::Result<Vec<u8>> {
        let encoded = bincode::serialize(self).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to encode chunk snapshot: {err}"),
            )
        })?;
        Ok(compress_lz4(&encoded))
    }

    pub fn decode_snapshot(bytes: &[u8]) -> io::Result<Self> {
        let decoded = decompress_lz4(bytes)?;
        bincode::deserialize(&decoded).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to decode chunk snapshot: {err}"),
            )
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WireFormat {
    Uncompressed,
    Zstd,
}

impl WireFormat {
    fn byte(self) -> u8 {
        match self {
            WireFormat::Uncompressed => 1,
            WireFormat::Zstd => 2,
        }
    }
}

pub struct RegionFile {
    path: PathBuf,
    chunks: HashMap<ChunkPos, SavedChunk>,
    dirty: bool,
}

impl RegionFile {
    pub const MAGIC: [u8; 4] = *b"STRR";

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            chunks: HashMap::new(),
            dirty: false,
        }
    }

    fn decode_payload(payload: &[u8]) -> io::Result<RegionPayload> {
        bincode::deserialize(payload).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to decode region payload: {err}"),
            )
        })
    }

    fn decode_payload_version(payload: &[u8]) -> io::Result<u32> {
        let mut cursor = Cursor::new(payload);
        bincode::deserialize_from::<_, u32>(&mut cursor).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to decode region version prefix: {err}"),
            )
        })
    }

    fn decode_payload_with_migration(payload: &[u8]) -> io::Result<RegionPayload> {
        let source_version = Self::decode_payload_version(payload)?;
        let migrated = migrate_region_payload(source_version, payload.to_vec()).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to migrate region payload from format v{source_version}: {err}"),
            )
        })?;
        if source_version != CURRENT_REGION_FORMAT_VERSION {
            info!(
                "Migrated region payload format v{} -> v{}",
                source_version, CURRENT_REGION_FORMAT_VERSION
            );
        }
        Self::decode_payload(&migrated)
    }

    /// Opens a region file, or an empty region if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self::empty(path));
        }

        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Ok(Self::empty(path));
        }

        if bytes.len() < Self::MAGIC.len() || bytes[..4] != Self::MAGIC[..] {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid region file magic; expected STRR",
            ));
        }

        let (wire_byte, wire_payload) =
            bytes[Self::MAGIC.len()..].split_first().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "missing region wire format byte")
            })?;

        let payload = if *wire_byte == WireFormat::Uncompressed.byte() {
            Self::decode_payload_with_migration(wire_payload)?
        } else if *wire_byte == WireFormat::Zstd.byte() {
            let decompressed = decompress_zstd(wire_payload).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("failed to decompress region payload: {err}"),
                )
            })?;
            Self::decode_payload_with_migration(&decompressed)?
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported region wire format {wire_byte}; expected 1 or 2"),
            ));
        };

        debug!(
            "Loaded region {:?} with {} chunks (format v{})",
            path,
            payload.chunks.len(),
            payload.format_version
        );

        Ok(Self {
            path,
            chunks: payload
                .chunks
                .into_iter()
                .map(|chunk| (chunk.pos, chunk))
                .collect(),
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save_chunk(&mut self, chunk: &Chunk) {
        self.save_saved_chunk(SavedChunk::from_chunk(chunk));
    }

    pub fn save_saved_chunk(&mut self, saved: SavedChunk) {
        self.chunks.insert(saved.pos, saved);
        self.dirty = true;
    }

    /// `Ok(None)` when the region has never stored this chunk.
    pub fn load_chunk(&self, pos: ChunkPos) -> io::Result<Option<Chunk>> {
        self.chunks.get(&pos).map(SavedChunk::to_chunk).transpose()
    }

    pub fn saved_chunk(&self, pos: ChunkPos) -> Option<&SavedChunk> {
        self.chunks.get(&pos)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_as(WireFormat::Zstd)
    }

    pub fn flush_as(&mut self, format: WireFormat) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut chunks: Vec<SavedChunk> = self.chunks.values().cloned().collect();
        chunks.sort_by_key(|chunk| (chunk.pos.x, chunk.pos.z));
        let payload = RegionPayload {
            format_version: CURRENT_REGION_FORMAT_VERSION,
            chunks,
        };

        let encoded = bincode::serialize(&payload).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to encode region payload: {err}"),
            )
        })?;
        let body = match format {
            WireFormat::Uncompressed => encoded,
            WireFormat::Zstd => compress_zstd(&encoded, REGION_ZSTD_LEVEL)?,
        };

        let mut bytes = Vec::with_capacity(Self::MAGIC.len() + 1 + body.len());
        bytes.extend_from_slice(&Self::MAGIC);
        bytes.push(format.byte());
        bytes.extend_from_slice(&body);

        fs::write(&self.path, bytes)?;
        self.dirty = false;
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk_positions(&self) -> Vec<ChunkPos> {
        let mut positions: Vec<ChunkPos> = self.chunks.keys().copied().collect();
        positions.sort_by_key(|pos| (pos.x, pos.z));
        positions
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use strata_world::block::BlockId;
    use strata_world::chunk::Chunk;
    use strata_world::coords::ChunkPos;

    use super::{region_coords, region_file_name, RegionFile, SavedChunk, WireFormat};

    fn temp_region_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "strata_region_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir.join(region_file_name(0, 0))
    }

    fn sample_chunk(pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        chunk.set(1, 2, 3, BlockId::STONE);
        chunk.set(4, 5, 6, BlockId::WOODEN_STAIRS);
        chunk.set_metadata(4, 5, 6, 3);
        chunk
    }

    #[test]
    fn region_coords_floor_negative_chunks() {
        assert_eq!(region_coords(ChunkPos::new(0, 15)), (0, 0));
        assert_eq!(region_coords(ChunkPos::new(16, -1)), (1, -1));
        assert_eq!(region_coords(ChunkPos::new(-17, -16)), (-2, -1));
        assert_eq!(region_file_name(-2, 3), "r.-2.3.strr");
    }

    #[test]
    fn saved_chunks_survive_a_flush_and_reopen() {
        let path = temp_region_path("reopen");
        let mut region = RegionFile::open(&path).expect("open missing region");
        assert_eq!(region.chunk_count(), 0);

        region.save_chunk(&sample_chunk(ChunkPos::new(1, 2)));
        region.save_chunk(&Chunk::new(ChunkPos::new(0, 0)));
        assert!(region.is_dirty());
        region.flush().expect("flush region");
        assert!(!region.is_dirty());

        let reopened = RegionFile::open(&path).expect("reopen region");
        assert_eq!(
            reopened.chunk_positions(),
            vec![ChunkPos::new(0, 0), ChunkPos::new(1, 2)]
        );
        let chunk = reopened
            .load_chunk(ChunkPos::new(1, 2))
            .expect("decode chunk")
            .expect("chunk present");
        assert_eq!(chunk.get(1, 2, 3), BlockId::STONE);
        assert_eq!(chunk.get(4, 5, 6), BlockId::WOODEN_STAIRS);
        assert_eq!(chunk.get_metadata(4, 5, 6), 3);
        assert!(reopened
            .load_chunk(ChunkPos::new(3, 3))
            .expect("missing chunk is not an error")
            .is_none());
    }

    #[test]
    fn uncompressed_regions_are_readable() {
        let path = temp_region_path("uncompressed");
        let mut region = RegionFile::open(&path).expect("open");
        region.save_chunk(&sample_chunk(ChunkPos::new(5, 5)));
        region.flush_as(WireFormat::Uncompressed).expect("flush");

        let bytes = fs::read(&path).expect("read region");
        assert_eq!(&bytes[..4], b"STRR");
        assert_eq!(bytes[4], 1);

        let reopened = RegionFile::open(&path).expect("reopen");
        assert_eq!(reopened.chunk_count(), 1);
    }

    #[test]
    fn v1_region_files_are_migrated_on_open() {
        #[derive(serde::Serialize)]
        struct V1Chunk {
            pos: ChunkPos,
            blocks: Vec<u8>,
        }
        #[derive(serde::Serialize)]
        struct V1Payload {
            format_version: u32,
            chunks: Vec<V1Chunk>,
        }

        let mut blocks = vec![0u8; strata_world::coords::CHUNK_VOLUME];
        blocks[0] = BlockId::BRICK.0;
        let payload = bincode::serialize(&V1Payload {
            format_version: 1,
            chunks: vec![V1Chunk {
                pos: ChunkPos::new(-1, 4),
                blocks,
            }],
        })
        .expect("serialize v1");

        let path = temp_region_path("v1");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        let mut bytes = b"STRR".to_vec();
        bytes.push(1);
        bytes.extend_from_slice(&payload);
        fs::write(&path, bytes).expect("write v1 region");

        let region = RegionFile::open(&path).expect("open v1 region");
        let saved = region.saved_chunk(ChunkPos::new(-1, 4)).expect("chunk present");
        assert!(saved.metadata.is_empty());
        let chunk = saved.to_chunk().expect("decode");
        assert_eq!(chunk.get(0, 0, 0), BlockId::BRICK);
    }

    #[test]
    fn bad_magic_and_wire_byte_are_invalid_data() {
        let path = temp_region_path("bad");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");

        fs::write(&path, b"NOPE\x02").expect("write");
        let err = RegionFile::open(&path).err().expect("bad magic must fail");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        fs::write(&path, b"STRR\x09abc").expect("write");
        let err = RegionFile::open(&path).err().expect("bad wire byte must fail");
        assert!(err.to_string().contains("unsupported region wire format 9"));
    }

    #[test]
    fn snapshots_keep_blocks_and_metadata() {
        let saved = SavedChunk::from_chunk(&sample_chunk(ChunkPos::new(7, -3)));
        let packed = saved.encode_snapshot().expect("encode");
        assert!(packed.len() < saved.blocks.len());
        assert_eq!(SavedChunk::decode_snapshot(&packed).expect("decode"), saved);
    }

    #[test]
    fn chunks_without_metadata_store_an_empty_grid() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set(0, 0, 0, BlockId::DIRT);
        let saved = SavedChunk::from_chunk(&chunk);
        assert!(saved.metadata.is_empty());

        let short = SavedChunk {
            blocks: vec![0; 3],
            ..saved
        };
        assert!(short.to_chunk().is_err());
    }
}
