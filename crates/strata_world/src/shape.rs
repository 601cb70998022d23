use bitflags::bitflags;
use glam::{IVec3, Vec3};

use crate::block::ShapeClass;
use crate::metadata::{is_open, Facing};
use crate::physics::Aabb;
use crate::world::World;

const SLAB_HEIGHT: f32 = 0.5;
const FENCE_HEIGHT: f32 = 1.5;
const FENCE_MIN: f32 = 0.375;
const FENCE_MAX: f32 = 0.625;
const PANE_MIN: f32 = 0.4375;
const PANE_MAX: f32 = 0.5625;
const TRAPDOOR_THICKNESS: f32 = 0.1875;

bitflags! {
    /// Horizontal sides on which a fence or pane joins its neighbour.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Connections: u8 {
        const EAST  = 0b0001;
        const WEST  = 0b0010;
        const SOUTH = 0b0100;
        const NORTH = 0b1000;
    }
}

impl Connections {
    fn from_facing(facing: Facing) -> Self {
        match facing {
            Facing::East => Connections::EAST,
            Facing::West => Connections::WEST,
            Facing::South => Connections::SOUTH,
            Facing::North => Connections::NORTH,
        }
    }
}

/// Concrete geometry of one block, resolved from its shape class, metadata
/// and (for fences and panes) its neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockShape {
    Empty,
    Cube,
    Slab,
    Stairs { facing: Facing },
    Fence { connections: Connections },
    Gate { facing: Facing, open: bool },
    Pane { connections: Connections },
    Trapdoor { facing: Facing, open: bool },
    DoorHalf { open: bool },
}

impl BlockShape {
    pub fn resolve(world: &World, pos: IVec3) -> Self {
        let block = world.get_block(pos);
        let props = world.registry().get_properties(block);
        if !props.solid {
            return BlockShape::Empty;
        }

        let metadata = world.get_metadata(pos);
        let facing = Facing::from_metadata(metadata);
        let open = is_open(metadata);
        match props.shape {
            ShapeClass::Empty => BlockShape::Empty,
            ShapeClass::Cube => BlockShape::Cube,
            ShapeClass::Slab => BlockShape::Slab,
            ShapeClass::Stairs => BlockShape::Stairs { facing },
            ShapeClass::Fence => BlockShape::Fence {
                connections: connections(world, pos, |class| {
                    matches!(class, ShapeClass::Fence | ShapeClass::FenceGate)
                }),
            },
            ShapeClass::FenceGate => BlockShape::Gate { facing, open },
            ShapeClass::Pane => BlockShape::Pane {
                connections: connections(world, pos, |class| class == ShapeClass::Pane),
            },
            ShapeClass::Trapdoor => BlockShape::Trapdoor { facing, open },
            ShapeClass::Door => BlockShape::DoorHalf { open },
        }
    }

    /// Solid boxes in cell-local coordinates. Fences reach above the cell.
    pub fn collision_boxes(&self) -> Vec<Aabb> {
        match *self {
            BlockShape::Empty => Vec::new(),
            BlockShape::Cube => vec![cell_box(0.0, 0.0, 0.0, 1.0, 1.0, 1.0)],
            BlockShape::Slab => vec![cell_box(0.0, 0.0, 0.0, 1.0, SLAB_HEIGHT, 1.0)],
            BlockShape::Stairs { facing } => {
                let step = match facing {
                    Facing::East => cell_box(0.5, 0.5, 0.0, 1.0, 1.0, 1.0),
                    Facing::West => cell_box(0.0, 0.5, 0.0, 0.5, 1.0, 1.0),
                    Facing::South => cell_box(0.0, 0.5, 0.5, 1.0, 1.0, 1.0),
                    Facing::North => cell_box(0.0, 0.5, 0.0, 1.0, 1.0, 0.5),
                };
                vec![cell_box(0.0, 0.0, 0.0, 1.0, SLAB_HEIGHT, 1.0), step]
            }
            BlockShape::Fence { connections } => {
                post_and_arms(connections, FENCE_MIN, FENCE_MAX, FENCE_HEIGHT)
            }
            BlockShape::Pane { connections } => post_and_arms(connections, PANE_MIN, PANE_MAX, 1.0),
            BlockShape::Gate { open: true, .. } => Vec::new(),
            BlockShape::Gate { facing, open: false } => {
                if facing.is_x_axis() {
                    vec![cell_box(FENCE_MIN, 0.0, 0.0, FENCE_MAX, FENCE_HEIGHT, 1.0)]
                } else {
                    vec![cell_box(0.0, 0.0, FENCE_MIN, 1.0, FENCE_HEIGHT, FENCE_MAX)]
                }
            }
            BlockShape::Trapdoor { open: false, .. } => {
                vec![cell_box(0.0, 0.0, 0.0, 1.0, TRAPDOOR_THICKNESS, 1.0)]
            }
            BlockShape::Trapdoor { facing, open: true } => {
                let far = 1.0 - TRAPDOOR_THICKNESS;
                vec![match facing {
                    Facing::East => cell_box(far, 0.0, 0.0, 1.0, 1.0, 1.0),
                    Facing::West => cell_box(0.0, 0.0, 0.0, TRAPDOOR_THICKNESS, 1.0, 1.0),
                    Facing::South => cell_box(0.0, 0.0, far, 1.0, 1.0, 1.0),
                    Facing::North => cell_box(0.0, 0.0, 0.0, 1.0, 1.0, TRAPDOOR_THICKNESS),
                }]
            }
            BlockShape::DoorHalf { open: true } => Vec::new(),
            BlockShape::DoorHalf { open: false } => vec![cell_box(0.0, 0.0, 0.0, 1.0, 1.0, 1.0)],
        }
    }

    /// Slabs and stairs are ray-tested against their real boxes; every other
    /// solid shape is treated as a full cube when targeting.
    pub fn raycast_boxes(&self) -> Vec<Aabb> {
        match self {
            BlockShape::Empty => Vec::new(),
            BlockShape::Slab | BlockShape::Stairs { .. } => self.collision_boxes(),
            _ => vec![cell_box(0.0, 0.0, 0.0, 1.0, 1.0, 1.0)],
        }
    }
}

fn cell_box(min_x: f32, min_y: f32, min_z: f32, max_x: f32, max_y: f32, max_z: f32) -> Aabb {
    Aabb::new(Vec3::new(min_x, min_y, min_z), Vec3::new(max_x, max_y, max_z))
}

fn post_and_arms(connections: Connections, lo: f32, hi: f32, height: f32) -> Vec<Aabb> {
    let mut boxes = vec![cell_box(lo, 0.0, lo, hi, height, hi)];
    if connections.contains(Connections::EAST) {
        boxes.push(cell_box(hi, 0.0, lo, 1.0, height, hi));
    }
    if connections.contains(Connections::WEST) {
        boxes.push(cell_box(0.0, 0.0, lo, lo, height, hi));
    }
    if connections.contains(Connections::SOUTH) {
        boxes.push(cell_box(lo, 0.0, hi, hi, height, 1.0));
    }
    if connections.contains(Connections::NORTH) {
        boxes.push(cell_box(lo, 0.0, 0.0, hi, height, lo));
    }
    boxes
}

/// Sides whose neighbour is solid or satisfies `joins`.
fn connections(world: &World, pos: IVec3, joins: impl Fn(ShapeClass) -> bool) -> Connections {
    let mut result = Connections::empty();
    for facing in Facing::ALL {
        let neighbor = world.get_block(pos + facing.offset());
        let props = world.registry().get_properties(neighbor);
        if props.solid || joins(props.shape) {
            result |= Connections::from_facing(facing);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use glam::{IVec3, Vec3};

    use super::{BlockShape, Connections};
    use crate::block::BlockId;
    use crate::chunk::Chunk;
    use crate::config::WorldSettings;
    use crate::coords::ChunkPos;
    use crate::metadata::{pack, Facing, MetadataFlags};
    use crate::world::World;

    fn world() -> World {
        let mut world = World::new(WorldSettings::default());
        world.insert_chunk(Chunk::new(ChunkPos::new(0, 0)));
        world
    }

    #[test]
    fn non_solid_blocks_have_no_shape() {
        let mut world = world();
        let pos = IVec3::new(2, 2, 2);
        assert_eq!(BlockShape::resolve(&world, pos), BlockShape::Empty);
        world.set_block(pos, BlockId::TORCH);
        assert_eq!(BlockShape::resolve(&world, pos), BlockShape::Empty);
        world.set_block(pos, BlockId::WATER);
        assert!(BlockShape::resolve(&world, pos).collision_boxes().is_empty());
    }

    #[test]
    fn fence_connects_to_fences_gates_and_solid_blocks() {
        let mut world = world();
        let pos = IVec3::new(5, 5, 5);
        world.set_block(pos, BlockId::FENCE);
        world.set_block(pos + IVec3::X, BlockId::FENCE);
        world.set_block(pos + IVec3::NEG_X, BlockId::FENCE_GATE);
        world.set_block(pos + IVec3::Z, BlockId::STONE);
        world.set_block(pos + IVec3::NEG_Z, BlockId::STONE_SLAB);
        assert_eq!(
            BlockShape::resolve(&world, pos),
            BlockShape::Fence {
                connections: Connections::all()
            }
        );

        world.set_block(pos + IVec3::NEG_Z, BlockId::FLOWER);
        world.set_block(pos + IVec3::Z, BlockId::AIR);
        assert_eq!(
            BlockShape::resolve(&world, pos),
            BlockShape::Fence {
                connections: Connections::EAST | Connections::WEST
            }
        );
    }

    #[test]
    fn pane_connects_to_panes_and_solid_blocks() {
        let mut world = world();
        let pos = IVec3::new(5, 5, 5);
        world.set_block(pos, BlockId::GLASS_PANE);
        world.set_block(pos + IVec3::NEG_Z, BlockId::GLASS_PANE);
        world.set_block(pos + IVec3::X, BlockId::FENCE);
        world.set_block(pos + IVec3::NEG_X, BlockId::TORCH);

        let shape = BlockShape::resolve(&world, pos);
        assert_eq!(
            shape,
            BlockShape::Pane {
                connections: Connections::NORTH | Connections::EAST
            }
        );
        assert_eq!(shape.collision_boxes().len(), 3);
    }

    #[test]
    fn gate_and_door_open_bit_removes_collision() {
        let mut world = world();
        let gate = IVec3::new(1, 1, 1);
        world.set_block_with_metadata(gate, BlockId::FENCE_GATE, pack(Facing::North, MetadataFlags::OPEN));
        assert_eq!(
            BlockShape::resolve(&world, gate),
            BlockShape::Gate {
                facing: Facing::North,
                open: true
            }
        );
        assert!(BlockShape::resolve(&world, gate).collision_boxes().is_empty());

        world.set_metadata(gate, pack(Facing::North, MetadataFlags::empty()));
        let boxes = BlockShape::resolve(&world, gate).collision_boxes();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].max.y, 1.5);
        assert_eq!(boxes[0].min.z, 0.375);

        let door = IVec3::new(3, 1, 1);
        world.set_block_with_metadata(door, BlockId::DOOR, MetadataFlags::OPEN.bits());
        assert!(BlockShape::resolve(&world, door).collision_boxes().is_empty());
        world.set_metadata(door, MetadataFlags::UPPER.bits());
        assert_eq!(
            BlockShape::resolve(&world, door),
            BlockShape::DoorHalf { open: false }
        );
    }

    #[test]
    fn trapdoor_lies_flat_when_closed_and_against_its_face_when_open() {
        let closed = BlockShape::Trapdoor {
            facing: Facing::West,
            open: false,
        }
        .collision_boxes();
        assert_eq!(closed[0].max.y, 0.1875);

        let open = BlockShape::Trapdoor {
            facing: Facing::South,
            open: true,
        }
        .collision_boxes();
        assert_eq!(open[0].min, Vec3::new(0.0, 0.0, 0.8125));
        assert_eq!(open[0].max, Vec3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn stairs_step_follows_facing() {
        let boxes = BlockShape::Stairs {
            facing: Facing::East,
        }
        .collision_boxes();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].min, Vec3::new(0.5, 0.5, 0.0));

        let north = BlockShape::Stairs {
            facing: Facing::North,
        }
        .collision_boxes();
        assert_eq!(north[1].max, Vec3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn raycast_boxes_simplify_thin_shapes_to_cubes() {
        let fence = BlockShape::Fence {
            connections: Connections::empty(),
        };
        assert_eq!(fence.raycast_boxes()[0].max, Vec3::ONE);
        assert_eq!(BlockShape::Slab.raycast_boxes()[0].max.y, 0.5);
    }
}
