use bitflags::bitflags;
use glam::IVec3;
use serde::{Deserialize, Serialize};

/// Fluid level stored in the metadata slot of a source cell.
pub const SOURCE_LEVEL: u8 = 8;
/// Level written into a cell that fluid is falling into.
pub const FALLING_LEVEL: u8 = 7;

const ORIENTATION_MASK: u8 = 0b0000_0011;

bitflags! {
    /// Per-block state bits layered on top of the orientation in bits 0-1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MetadataFlags: u8 {
        const OPEN  = 0b0000_0100;
        const UPPER = 0b0000_1000;
    }
}

/// Horizontal orientation packed into metadata bits 0-1.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    #[default]
    East = 0,
    West = 1,
    South = 2,
    North = 3,
}

impl Facing {
    pub const ALL: [Facing; 4] = [Facing::East, Facing::West, Facing::South, Facing::North];

    pub fn from_metadata(metadata: u8) -> Self {
        match metadata & ORIENTATION_MASK {
            0 => Facing::East,
            1 => Facing::West,
            2 => Facing::South,
            _ => Facing::North,
        }
    }

    pub fn offset(self) -> IVec3 {
        match self {
            Facing::East => IVec3::X,
            Facing::West => IVec3::NEG_X,
            Facing::South => IVec3::Z,
            Facing::North => IVec3::NEG_Z,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Facing::East => Facing::West,
            Facing::West => Facing::East,
            Facing::South => Facing::North,
            Facing::North => Facing::South,
        }
    }

    /// True for east/west, the facings that point along x.
    pub fn is_x_axis(self) -> bool {
        matches!(self, Facing::East | Facing::West)
    }

    pub fn bits(self) -> u8 {
        self as u8
    }
}

pub fn flags(metadata: u8) -> MetadataFlags {
    MetadataFlags::from_bits_truncate(metadata)
}

pub fn is_open(metadata: u8) -> bool {
    flags(metadata).contains(MetadataFlags::OPEN)
}

pub fn is_upper_half(metadata: u8) -> bool {
    flags(metadata).contains(MetadataFlags::UPPER)
}

pub fn pack(facing: Facing, state: MetadataFlags) -> u8 {
    facing.bits() | state.bits()
}

/// Toggles the open bit, leaving orientation and the upper-half bit intact.
pub fn toggle_open(metadata: u8) -> u8 {
    metadata ^ MetadataFlags::OPEN.bits()
}

/// Fluid level for a fluid cell's metadata. An unset slot counts as a source.
pub fn fluid_level(metadata: u8) -> u8 {
    match metadata {
        0 => SOURCE_LEVEL,
        level => level.min(SOURCE_LEVEL),
    }
}

pub fn is_source(metadata: u8) -> bool {
    fluid_level(metadata) == SOURCE_LEVEL
}
