use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use strata_persist::region::{region_coords, region_file_name, RegionFile, SavedChunk};
use strata_persist::versioning::CURRENT_REGION_FORMAT_VERSION;
use strata_world::chunk::Chunk;
use strata_world::coords::ChunkPos;

const META_FILE: &str = "world.toml";

/// Written next to the region directory so a reopened world keeps its seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub seed: u64,
    pub format_version: u32,
}

impl WorldMeta {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            format_version: CURRENT_REGION_FORMAT_VERSION,
        }
    }
}

pub struct PersistenceLayer {
    world_dir: PathBuf,
    regions: HashMap<(i32, i32), RegionFile>,
    /// lz4 snapshots of chunks whose region write failed, retried on the next
    /// save.
    unsaved: HashMap<ChunkPos, Vec<u8>>,
}

impl PersistenceLayer {
    pub fn open(world_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(world_dir)?;
        Ok(Self {
            world_dir: world_dir.to_path_buf(),
            regions: HashMap::new(),
            unsaved: HashMap::new(),
        })
    }

    pub fn read_meta(&self) -> io::Result<Option<WorldMeta>> {
        let path = self.world_dir.join(META_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text).map(Some).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid world metadata {}: {err}", path.display()),
            )
        })
    }

    pub fn write_meta(&self, meta: &WorldMeta) -> io::Result<()> {
        let text = toml::to_string(meta).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to encode world metadata: {err}"),
            )
        })?;
        fs::write(self.world_dir.join(META_FILE), text)
    }

    pub fn load_chunk(&mut self, pos: ChunkPos) -> io::Result<Option<Chunk>> {
        if let Some(snapshot) = self.unsaved.get(&pos) {
            let saved = SavedChunk::decode_snapshot(snapshot)?;
            return saved.to_chunk().map(Some);
        }
        let region = self.region_mut(region_coords(pos))?;
        region.load_chunk(pos)
    }

    /// Stages a chunk in its region without writing it.
    pub fn stage_chunk(&mut self, chunk: &Chunk) -> io::Result<()> {
        let region = self.region_mut(region_coords(chunk.pos()))?;
        region.save_chunk(chunk);
        Ok(())
    }

    pub fn save_chunk(&mut self, chunk: &Chunk) -> io::Result<()> {
        let region = self.region_mut(region_coords(chunk.pos()))?;
        region.save_chunk(chunk);
        region.flush()
    }

    /// Keeps an in-memory copy of a chunk that could not be written, so it
    /// can be evicted from the world without losing edits.
    pub fn retain_snapshot(&mut self, chunk: &Chunk) -> io::Result<()> {
        let snapshot = SavedChunk::from_chunk(chunk).encode_snapshot()?;
        self.unsaved.insert(chunk.pos(), snapshot);
        Ok(())
    }

    pub fn unsaved_count(&self) -> usize {
        self.unsaved.len()
    }

    /// Writes every region with staged changes, retrying held snapshots first.
    pub fn flush_all(&mut self) -> io::Result<()> {
        let snapshots: Vec<(ChunkPos, Vec<u8>)> = self.unsaved.drain().collect();
        for (pos, snapshot) in snapshots {
            let staged = SavedChunk::decode_snapshot(&snapshot).and_then(|saved| {
                let region = self.region_mut(region_coords(pos))?;
                region.save_saved_chunk(saved);
                Ok(())
            });
            if let Err(err) = staged {
                warn!("Dropping unreadable snapshot of chunk {:?}: {}", pos, err);
            }
        }

        let mut first_error = None;
        for region in self.regions.values_mut().filter(|region| region.is_dirty()) {
            debug!("Flushing region {}", region.path().display());
            if let Err(err) = region.flush() {
                warn!("Failed to flush region {}: {}", region.path().display(), err);
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn region_path(&self, region_coords: (i32, i32)) -> PathBuf {
        let (rx, rz) = region_coords;
        self.world_dir.join("region").join(region_file_name(rx, rz))
    }

    fn region_mut(&mut self, region_coords: (i32, i32)) -> io::Result<&mut RegionFile> {
        if !self.regions.contains_key(&region_coords) {
            let region_path = self.region_path(region_coords);
            let region = RegionFile::open(region_path)?;
            self.regions.insert(region_coords, region);
        }

        self.regions.get_mut(&region_coords).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "failed to access cached region file",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use strata_world::block::BlockId;
    use strata_world::chunk::Chunk;
    use strata_world::coords::ChunkPos;

    use super::{PersistenceLayer, WorldMeta};

    fn temp_world(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "strata_persistence_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn meta_round_trips_through_world_toml() {
        let dir = temp_world("meta");
        let layer = PersistenceLayer::open(&dir).expect("open");
        assert_eq!(layer.read_meta().expect("read"), None);

        layer.write_meta(&WorldMeta::new(1234)).expect("write");
        let meta = layer.read_meta().expect("read").expect("meta present");
        assert_eq!(meta.seed, 1234);
        assert!(dir.join("world.toml").exists());
    }

    #[test]
    fn chunks_in_different_regions_land_in_different_files() {
        let dir = temp_world("regions");
        let mut layer = PersistenceLayer::open(&dir).expect("open");

        let mut near = Chunk::new(ChunkPos::new(1, 1));
        near.set(0, 0, 0, BlockId::GLASS);
        let mut far = Chunk::new(ChunkPos::new(-20, 40));
        far.set(0, 0, 0, BlockId::BRICK);
        layer.stage_chunk(&near).expect("stage");
        layer.stage_chunk(&far).expect("stage");
        layer.flush_all().expect("flush");

        assert!(dir.join("region").join("r.0.0.strr").exists());
        assert!(dir.join("region").join("r.-2.2.strr").exists());

        let mut reopened = PersistenceLayer::open(&dir).expect("reopen");
        let chunk = reopened
            .load_chunk(ChunkPos::new(-20, 40))
            .expect("load")
            .expect("present");
        assert_eq!(chunk.get(0, 0, 0), BlockId::BRICK);
    }

    #[test]
    fn snapshots_are_served_until_flushed() {
        let dir = temp_world("snapshots");
        let mut layer = PersistenceLayer::open(&dir).expect("open");
        let mut chunk = Chunk::new(ChunkPos::new(3, 3));
        chunk.set(2, 2, 2, BlockId::SNOW);

        layer.retain_snapshot(&chunk).expect("snapshot");
        assert_eq!(layer.unsaved_count(), 1);
        let loaded = layer
            .load_chunk(ChunkPos::new(3, 3))
            .expect("load")
            .expect("present");
        assert_eq!(loaded.get(2, 2, 2), BlockId::SNOW);

        layer.flush_all().expect("flush");
        assert_eq!(layer.unsaved_count(), 0);
        let mut reopened = PersistenceLayer::open(&dir).expect("reopen");
        assert!(reopened
            .load_chunk(ChunkPos::new(3, 3))
            .expect("load")
            .is_some());
    }
}
