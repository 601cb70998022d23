use serde::{Deserialize, Serialize};
use tracing::info;

use strata_world::coords::{ChunkPos, CHUNK_VOLUME};

use crate::region::SavedChunk;

/// v1 stored block bytes only; v2 adds a metadata byte per cell.
pub const CURRENT_REGION_FORMAT_VERSION: u32 = 2;

#[derive(Serialize, Deserialize)]
pub(crate) struct RegionPayload {
    pub format_version: u32,
    pub chunks: Vec<SavedChunk>,
}

#[derive(Serialize, Deserialize)]
struct RegionPayloadV1 {
    format_version: u32,
    chunks: Vec<SavedChunkV1>,
}

#[derive(Serialize, Deserialize)]
struct SavedChunkV1 {
    pos: ChunkPos,
    blocks: Vec<u8>,
}

pub fn migrate_region_payload(mut version: u32, mut payload: Vec<u8>) -> Result<Vec<u8>, String> {
    if version == CURRENT_REGION_FORMAT_VERSION {
        return Ok(payload);
    }

    if version == 0 || version > CURRENT_REGION_FORMAT_VERSION {
        return Err(format!(
            "unsupported region format version {version}; current version is {CURRENT_REGION_FORMAT_VERSION}"
        ));
    }

    while version < CURRENT_REGION_FORMAT_VERSION {
        let next_version = version + 1;
        info!("Migrating region payload format v{version} -> v{next_version}");
        payload = migrate_one_version(version, payload)?;
        version = next_version;
    }

    Ok(payload)
}

fn migrate_one_version(version: u32, payload: Vec<u8>) -> Result<Vec<u8>, String> {
    match version {
        1 => migrate_region_v1_to_v2(payload),
        other => Err(format!(
            "missing migration path for region format v{other} -> v{}",
            other + 1
        )),
    }
}

fn migrate_region_v1_to_v2(payload: Vec<u8>) -> Result<Vec<u8>, String> {
    let v1: RegionPayloadV1 = bincode::deserialize(&payload)
        .map_err(|err| format!("failed to decode v1 region payload: {err}"))?;

    let chunks = v1
        .chunks
        .into_iter()
        .map(|chunk| {
            if chunk.blocks.len() != CHUNK_VOLUME {
                return Err(format!(
                    "chunk {:?} has {} blocks; expected {}",
                    chunk.pos,
                    chunk.blocks.len(),
                    CHUNK_VOLUME
                ));
            }
            Ok(SavedChunk {
                pos: chunk.pos,
                blocks: chunk.blocks,
                metadata: Vec::new(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let v2 = RegionPayload {
        format_version: CURRENT_REGION_FORMAT_VERSION,
        chunks,
    };
    bincode::serialize(&v2).map_err(|err| format!("failed to encode migrated v2 payload: {err}"))
}

#[cfg(test)]
mod tests {
    use super::{
        migrate_region_payload, RegionPayload, RegionPayloadV1, SavedChunkV1,
        CURRENT_REGION_FORMAT_VERSION,
    };
    use strata_world::block::BlockId;
    use strata_world::coords::{ChunkPos, CHUNK_VOLUME};

    #[test]
    fn migrate_v1_payload_to_current_v2_format() {
        let payload_v1 = bincode::serialize(&RegionPayloadV1 {
            format_version: 1,
            chunks: vec![SavedChunkV1 {
                pos: ChunkPos::new(2, -1),
                blocks: vec![BlockId::SAND.0; CHUNK_VOLUME],
            }],
        })
        .expect("serialize v1 payload");

        let migrated =
            migrate_region_payload(1, payload_v1).expect("migrate region payload from v1 to v2");
        let decoded: RegionPayload =
            bincode::deserialize(&migrated).expect("deserialize migrated v2 payload");

        assert_eq!(decoded.format_version, CURRENT_REGION_FORMAT_VERSION);
        assert_eq!(decoded.chunks.len(), 1);
        let chunk = decoded.chunks[0].to_chunk().expect("valid migrated chunk");
        assert_eq!(chunk.pos(), ChunkPos::new(2, -1));
        assert_eq!(chunk.get(0, 0, 0), BlockId::SAND);
        assert_eq!(chunk.get_metadata(5, 5, 5), 0);
    }

    #[test]
    fn short_v1_chunk_is_rejected() {
        let payload_v1 = bincode::serialize(&RegionPayloadV1 {
            format_version: 1,
            chunks: vec![SavedChunkV1 {
                pos: ChunkPos::new(0, 0),
                blocks: vec![1; 10],
            }],
        })
        .expect("serialize v1 payload");

        let err = migrate_region_payload(1, payload_v1).expect_err("short chunk must fail");
        assert!(err.contains("has 10 blocks"));
    }

    #[test]
    fn current_version_payload_is_unchanged() {
        let payload = bincode::serialize(&RegionPayload {
            format_version: CURRENT_REGION_FORMAT_VERSION,
            chunks: Vec::new(),
        })
        .expect("serialize v2 payload");

        let migrated = migrate_region_payload(CURRENT_REGION_FORMAT_VERSION, payload.clone())
            .expect("no-op migration should succeed");
        assert_eq!(migrated, payload);
    }

    #[test]
    fn unknown_version_returns_error() {
        let err = migrate_region_payload(99, vec![1, 2, 3]).expect_err("unknown version must fail");
        assert!(err.contains("unsupported region format version 99"));
    }
}
