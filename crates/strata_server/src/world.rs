use std::path::Path;

use tracing::{debug, info, warn};

use strata_world::config::WorldSettings;
use strata_world::coords::ChunkPos;
use strata_world::fluid::FluidChange;
use strata_world::world::World;

use crate::persistence::{PersistenceLayer, WorldMeta};

/// The simulated world plus the storage it streams chunks from.
pub struct ServerWorld {
    world: World,
    persistence: Option<PersistenceLayer>,
}

impl ServerWorld {
    /// Opens (or creates) the world at `world_dir`. A seed recorded in the
    /// world's metadata wins over the configured one.
    pub fn with_persistence(world_dir: &Path, mut settings: WorldSettings) -> Self {
        let persistence = match PersistenceLayer::open(world_dir) {
            Ok(persistence) => Some(persistence),
            Err(err) => {
                warn!(
                    "Failed to initialize persistence at {}: {}",
                    world_dir.display(),
                    err
                );
                None
            }
        };

        if let Some(persistence) = &persistence {
            match persistence.read_meta() {
                Ok(Some(meta)) => {
                    if meta.seed != settings.seed {
                        info!(
                            "Using stored world seed {} instead of configured {}",
                            meta.seed, settings.seed
                        );
                    }
                    settings.seed = meta.seed;
                }
                Ok(None) => {
                    if let Err(err) = persistence.write_meta(&WorldMeta::new(settings.seed)) {
                        warn!("Failed to write world metadata: {}", err);
                    }
                }
                Err(err) => warn!("Failed to read world metadata: {}", err),
            }
        }

        Self {
            world: World::new(settings),
            persistence,
        }
    }

    /// In-memory only; nothing is loaded from or written to disk.
    #[cfg(test)]
    pub fn without_persistence(settings: WorldSettings) -> Self {
        Self {
            world: World::new(settings),
            persistence: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn world_seed(&self) -> u64 {
        self.world.seed()
    }

    pub fn unsaved_snapshot_count(&self) -> usize {
        self.persistence
            .as_ref()
            .map_or(0, PersistenceLayer::unsaved_count)
    }

    /// Makes sure every chunk within `radius` (Chebyshev) of the chunk
    /// containing column `(center_x, center_z)` is loaded, nearest first.
    /// Returns how many chunks were brought in.
    pub fn stream_chunks(&mut self, center_x: i32, center_z: i32, radius: i32) -> usize {
        let center = ChunkPos::containing(center_x, center_z);
        let mut missing: Vec<ChunkPos> = Vec::new();
        for dx in -radius..=radius {
            for dz in -radius..=radius {
                let pos = center + ChunkPos::new(dx, dz);
                if !self.world.is_chunk_loaded(pos) {
                    missing.push(pos);
                }
            }
        }
        missing.sort_by_key(|pos| (pos.chebyshev_distance(center), pos.x, pos.z));

        for &pos in &missing {
            self.ensure_chunk(pos);
        }
        if !missing.is_empty() {
            debug!("Streamed {} chunk(s) around {:?}", missing.len(), center);
        }
        missing.len()
    }

    fn ensure_chunk(&mut self, pos: ChunkPos) {
        if let Some(persistence) = self.persistence.as_mut() {
            match persistence.load_chunk(pos) {
                Ok(Some(chunk)) => {
                    self.world.insert_chunk(chunk);
                    return;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Failed to load chunk {:?}, regenerating: {}", pos, err);
                }
            }
        }
        self.world.generate_chunk(pos.x, pos.z);
    }

    /// Evicts chunks beyond the view radius, writing the modified ones first.
    pub fn evict_far_chunks(&mut self, center_x: i32, center_z: i32, radius: i32) -> usize {
        let evicted = self.world.unload_far_chunks(center_x, center_z, radius);
        let Some(persistence) = self.persistence.as_mut() else {
            return evicted.len();
        };

        for chunk in evicted.iter().filter(|chunk| chunk.is_modified()) {
            if let Err(err) = persistence.save_chunk(chunk) {
                warn!(
                    "Failed to save evicted chunk {:?}, keeping a snapshot: {}",
                    chunk.pos(),
                    err
                );
                if let Err(err) = persistence.retain_snapshot(chunk) {
                    warn!("Lost edits to chunk {:?}: {}", chunk.pos(), err);
                }
            }
        }
        evicted.len()
    }

    /// Writes every modified chunk. Returns how many were saved.
    pub fn save_modified_chunks(&mut self) -> usize {
        let Some(persistence) = self.persistence.as_mut() else {
            return 0;
        };

        let mut staged = Vec::new();
        for chunk in self.world.modified_chunks() {
            match persistence.stage_chunk(chunk) {
                Ok(()) => staged.push(chunk.pos()),
                Err(err) => warn!("Failed to stage chunk {:?}: {}", chunk.pos(), err),
            }
        }

        if let Err(err) = persistence.flush_all() {
            warn!("Failed to flush region files: {}", err);
            return 0;
        }
        for &pos in &staged {
            self.world.mark_chunk_saved(pos);
        }
        staged.len()
    }

    pub fn tick_fluids(&mut self) -> Vec<FluidChange> {
        self.world.tick_fluids()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use glam::IVec3;
    use strata_world::block::BlockId;
    use strata_world::config::WorldSettings;
    use strata_world::coords::ChunkPos;

    use super::ServerWorld;

    fn temp_world(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "strata_server_world_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn streaming_loads_a_square_around_the_center() {
        let mut world = ServerWorld::without_persistence(WorldSettings::with_seed(3));
        assert_eq!(world.stream_chunks(0, 0, 1), 9);
        assert_eq!(world.stream_chunks(0, 0, 1), 0);
        assert!(world.world().is_chunk_loaded(ChunkPos::new(-1, 1)));
        assert!(!world.world().is_chunk_loaded(ChunkPos::new(2, 0)));
    }

    #[test]
    fn edits_survive_save_and_reopen() {
        let dir = temp_world("reopen");
        let pos = IVec3::new(5, 100, 5);
        {
            let mut world = ServerWorld::with_persistence(&dir, WorldSettings::with_seed(11));
            world.stream_chunks(0, 0, 0);
            world.world_mut().set_block(pos, BlockId::GLOWSTONE);
            assert!(world.save_modified_chunks() >= 1);
            assert_eq!(world.world().modified_chunks().count(), 0);
        }

        let mut reopened = ServerWorld::with_persistence(&dir, WorldSettings::with_seed(999));
        assert_eq!(reopened.world_seed(), 11);
        reopened.stream_chunks(0, 0, 0);
        assert_eq!(reopened.world().get_block(pos), BlockId::GLOWSTONE);
        assert_eq!(reopened.world().get_light(pos), 15);
    }

    #[test]
    fn evicted_modified_chunks_are_written_first() {
        let dir = temp_world("evict");
        let far = IVec3::new(16 * 10 + 3, 100, 3);
        let mut world = ServerWorld::with_persistence(&dir, WorldSettings::with_seed(5));
        world.stream_chunks(far.x, far.z, 0);
        world.world_mut().set_block(far, BlockId::BRICK);

        let evicted = world.evict_far_chunks(0, 0, 1);
        assert_eq!(evicted, 1);
        assert!(!world.world().is_chunk_loaded(ChunkPos::new(10, 0)));

        world.stream_chunks(far.x, far.z, 0);
        assert_eq!(world.world().get_block(far), BlockId::BRICK);
    }
}
