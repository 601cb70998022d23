use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

#[repr(transparent)]
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Pod,
    Zeroable,
)]
pub struct BlockId(pub u8);

impl BlockId {
    pub const AIR: Self = Self(0);
    pub const DIRT: Self = Self(1);
    pub const STONE: Self = Self(2);
    pub const GRASS: Self = Self(3);
    pub const WOOD: Self = Self(4);
    pub const LEAVES: Self = Self(5);
    pub const SAND: Self = Self(6);
    pub const WATER: Self = Self(7);
    pub const GLASS: Self = Self(8);
    pub const BRICK: Self = Self(9);
    pub const PLANK: Self = Self(10);
    pub const COBBLESTONE: Self = Self(11);
    pub const BEDROCK: Self = Self(12);
    pub const COAL_ORE: Self = Self(13);
    pub const IRON_ORE: Self = Self(14);
    pub const GOLD_ORE: Self = Self(15);
    pub const DIAMOND_ORE: Self = Self(16);
    pub const CACTUS: Self = Self(17);
    pub const SNOW: Self = Self(18);
    pub const SPRUCE_WOOD: Self = Self(19);
    pub const SPRUCE_LEAVES: Self = Self(20);
    pub const TORCH: Self = Self(21);
    pub const GLOWSTONE: Self = Self(22);
    pub const LAVA: Self = Self(23);
    pub const STONE_SLAB: Self = Self(24);
    pub const WOODEN_STAIRS: Self = Self(25);
    pub const FENCE: Self = Self(26);
    pub const FENCE_GATE: Self = Self(27);
    pub const GLASS_PANE: Self = Self(28);
    pub const TRAPDOOR: Self = Self(29);
    pub const DOOR: Self = Self(30);
    pub const FLOWER: Self = Self(31);

    pub fn is_air(self) -> bool {
        self == Self::AIR
    }
}

/// Geometry family of a block type. Combined with metadata and neighbours it
/// resolves into a concrete [`crate::shape::BlockShape`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeClass {
    /// No collision volume (air, fluids, torches, plants).
    Empty,
    #[default]
    Cube,
    Slab,
    Stairs,
    Fence,
    FenceGate,
    Pane,
    Trapdoor,
    Door,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockProperties {
    pub name: String,
    pub solid: bool,
    pub transparent: bool,
    pub hardness: f32,
    #[serde(default)]
    pub light_level: u8,
    #[serde(default)]
    pub shape: ShapeClass,
    #[serde(default)]
    pub fluid: bool,
}

impl BlockProperties {
    /// Blocks light: anything that is not transparent.
    pub fn is_opaque(&self) -> bool {
        !self.transparent
    }

    pub fn emits_light(&self) -> bool {
        self.light_level > 0
    }

    /// Fluids may flow into this cell, destroying what is there.
    pub fn is_replaceable(&self) -> bool {
        !self.solid && !self.fluid
    }
}

#[derive(Default, Debug, Clone)]
pub struct BlockRegistry {
    properties: Vec<BlockProperties>,
    by_name: HashMap<String, BlockId>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    pub fn register(&mut self, props: BlockProperties) -> BlockId {
        if let Some(existing) = self.by_name.get(props.name.as_str()) {
            return *existing;
        }

        let next_index = self.properties.len();
        let id = BlockId(
            u8::try_from(next_index).expect("block registry exceeded BlockId capacity (u8::MAX)"),
        );

        self.by_name.insert(props.name.clone(), id);
        self.properties.push(props);
        id
    }

    /// Unknown ids resolve to the properties of air.
    pub fn get_properties(&self, id: BlockId) -> &BlockProperties {
        self.properties
            .get(id.0 as usize)
            .or_else(|| self.properties.get(BlockId::AIR.0 as usize))
            .expect("block registry is empty; call register_default_blocks() first")
    }

    pub fn get_by_name(&self, name: &str) -> Option<BlockId> {
        self.by_name.get(name).copied()
    }

    /// Accepts either a registered name or a numeric id.
    pub fn resolve(&self, name_or_id: &str) -> Option<BlockId> {
        if let Some(id) = self.get_by_name(name_or_id) {
            return Some(id);
        }
        let raw = name_or_id.parse::<u8>().ok()?;
        ((raw as usize) < self.properties.len()).then_some(BlockId(raw))
    }

    pub fn is_opaque(&self, id: BlockId) -> bool {
        self.get_properties(id).is_opaque()
    }

    pub fn is_fluid(&self, id: BlockId) -> bool {
        self.get_properties(id).fluid
    }

    pub fn light_level(&self, id: BlockId) -> u8 {
        self.get_properties(id).light_level
    }

    pub fn shape_class(&self, id: BlockId) -> ShapeClass {
        self.get_properties(id).shape
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

pub fn register_default_blocks() -> BlockRegistry {
    fn block(name: &str, solid: bool, transparent: bool, hardness: f32) -> BlockProperties {
        shaped(name, solid, transparent, hardness, ShapeClass::Cube)
    }

    fn shaped(
        name: &str,
        solid: bool,
        transparent: bool,
        hardness: f32,
        shape: ShapeClass,
    ) -> BlockProperties {
        BlockProperties {
            name: name.to_string(),
            solid,
            transparent,
            hardness,
            light_level: 0,
            shape,
            fluid: false,
        }
    }

    fn block_with_light(
        name: &str,
        solid: bool,
        transparent: bool,
        hardness: f32,
        light_level: u8,
    ) -> BlockProperties {
        let shape = if solid {
            ShapeClass::Cube
        } else {
            ShapeClass::Empty
        };
        BlockProperties {
            light_level,
            ..shaped(name, solid, transparent, hardness, shape)
        }
    }

    fn fluid(name: &str, light_level: u8) -> BlockProperties {
        BlockProperties {
            fluid: true,
            ..block_with_light(name, false, true, 100.0, light_level)
        }
    }

    let mut registry = BlockRegistry::new();

    let defaults = [
        shaped("air", false, true, 0.0, ShapeClass::Empty),
        block("dirt", true, false, 0.5),
        block("stone", true, false, 1.5),
        block("grass", true, false, 0.6),
        block("wood", true, false, 2.0),
        block("leaves", true, true, 0.2),
        block("sand", true, false, 0.5),
        fluid("water", 0),
        block("glass", true, true, 0.3),
        block("brick", true, false, 2.0),
        block("plank", true, false, 2.0),
        block("cobblestone", true, false, 2.0),
        block("bedrock", true, false, f32::INFINITY),
        block("coal_ore", true, false, 3.0),
        block("iron_ore", true, false, 3.0),
        block("gold_ore", true, false, 3.0),
        block("diamond_ore", true, false, 3.0),
        block("cactus", true, true, 0.4),
        block("snow", true, false, 0.2),
        block("spruce_wood", true, false, 2.0),
        block("spruce_leaves", true, true, 0.2),
        block_with_light("torch", false, true, 0.0, 15),
        block_with_light("glowstone", true, false, 0.3, 15),
        fluid("lava", 15),
        shaped("stone_slab", true, true, 2.0, ShapeClass::Slab),
        shaped("wooden_stairs", true, true, 2.0, ShapeClass::Stairs),
        shaped("fence", true, true, 2.0, ShapeClass::Fence),
        shaped("fence_gate", true, true, 2.0, ShapeClass::FenceGate),
        shaped("glass_pane", true, true, 0.3, ShapeClass::Pane),
        shaped("trapdoor", true, true, 3.0, ShapeClass::Trapdoor),
        shaped("door", true, true, 3.0, ShapeClass::Door),
        shaped("flower", false, true, 0.0, ShapeClass::Empty),
    ];

    for (idx, props) in defaults.into_iter().enumerate() {
        let id = registry.register(props);
        debug_assert_eq!(id.0 as usize, idx, "default block IDs must be stable");
    }

    registry
}
