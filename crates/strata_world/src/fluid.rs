//! Tick-driven fluid automaton over the world's active-cell set.
//!
//! Each tick reads the state left by the previous one, plans every write, and
//! only then applies them, so the result does not depend on visiting order.

use std::collections::hash_map::Entry;

use glam::IVec3;
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::block::BlockId;
use crate::coords::in_world_height;
use crate::metadata::{fluid_level, FALLING_LEVEL, SOURCE_LEVEL};
use crate::world::World;

const FLUID_HORIZONTAL_DIRECTIONS: [IVec3; 4] = [
    IVec3::new(1, 0, 0),
    IVec3::new(-1, 0, 0),
    IVec3::new(0, 0, 1),
    IVec3::new(0, 0, -1),
];
const FLUID_DOWN_DIRECTION: IVec3 = IVec3::new(0, -1, 0);
const FLUID_UP_DIRECTION: IVec3 = IVec3::new(0, 1, 0);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FluidChange {
    pub world_pos: IVec3,
    pub new_block: BlockId,
    pub metadata: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Planned {
    Set { block: BlockId, level: u8 },
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Settle {
    Keep,
    Promote,
    Lower(u8),
    Drain,
}

/// Runs one fluid step and returns every cell it changed.
pub fn tick(world: &mut World) -> Vec<FluidChange> {
    let mut active: Vec<IVec3> = world.active_fluids.drain().collect();
    active.sort_by_key(|pos| (pos.x, pos.y, pos.z));

    let mut plan: FxHashMap<IVec3, Planned> = FxHashMap::default();
    for pos in active.iter().copied() {
        let Some(block) = world.loaded_block(pos) else {
            continue;
        };
        if !world.registry().is_fluid(block) {
            continue;
        }

        let mut level = fluid_level(world.get_metadata(pos));
        if level < SOURCE_LEVEL {
            match settle_flowing(world, pos, block, level) {
                Settle::Keep => {}
                Settle::Promote => {
                    plan_write(&mut plan, pos, Planned::Set { block, level: SOURCE_LEVEL });
                    continue;
                }
                Settle::Lower(lowered) => {
                    plan_write(&mut plan, pos, Planned::Set { block, level: lowered });
                    level = lowered;
                }
                Settle::Drain => {
                    plan_write(&mut plan, pos, Planned::Clear);
                    continue;
                }
            }
        }

        let below = pos + FLUID_DOWN_DIRECTION;
        if can_fall_into(world, below, block) {
            let fallen = if level == SOURCE_LEVEL {
                SOURCE_LEVEL
            } else {
                FALLING_LEVEL
            };
            plan_write(&mut plan, pos, Planned::Clear);
            plan_write(&mut plan, below, Planned::Set { block, level: fallen });
            continue;
        }

        if level <= 1 {
            continue;
        }
        let spread = level - 1;
        for direction in FLUID_HORIZONTAL_DIRECTIONS {
            let neighbor = pos + direction;
            if can_spread_into(world, neighbor, block, spread) {
                plan_write(&mut plan, neighbor, Planned::Set { block, level: spread });
            }
        }
    }

    let changes = apply_plan(world, plan);
    trace!(
        active = active.len(),
        changes = changes.len(),
        next = world.active_fluid_count(),
        "fluid tick"
    );
    changes
}

/// Decides what happens to a flowing cell given its neighbours: promotion to
/// a source between two sources, or decay when nothing feeds it any more.
fn settle_flowing(world: &World, pos: IVec3, block: BlockId, level: u8) -> Settle {
    let mut is_source = [false; 4];
    let mut strongest = 0;
    for (index, direction) in FLUID_HORIZONTAL_DIRECTIONS.into_iter().enumerate() {
        let neighbor = pos + direction;
        if world.loaded_block(neighbor) != Some(block) {
            continue;
        }
        let neighbor_level = fluid_level(world.get_metadata(neighbor));
        is_source[index] = neighbor_level == SOURCE_LEVEL;
        strongest = strongest.max(neighbor_level);
    }

    // Sources must sit on opposite sides (east/west or south/north).
    let between_sources = (is_source[0] && is_source[1]) || (is_source[2] && is_source[3]);
    if between_sources && is_supported(world, pos + FLUID_DOWN_DIRECTION, block) {
        return Settle::Promote;
    }

    let fed_from_above = world.loaded_block(pos + FLUID_UP_DIRECTION) == Some(block);
    let desired = if fed_from_above {
        FALLING_LEVEL
    } else {
        strongest.saturating_sub(1)
    };

    if desired == 0 {
        Settle::Drain
    } else if desired < level {
        Settle::Lower(desired)
    } else {
        Settle::Keep
    }
}

fn is_supported(world: &World, below: IVec3, block: BlockId) -> bool {
    match world.loaded_block(below) {
        Some(below_block) => {
            below_block == block || world.registry().get_properties(below_block).solid
        }
        None => false,
    }
}

fn can_fall_into(world: &World, below: IVec3, block: BlockId) -> bool {
    if !in_world_height(below.y) {
        return false;
    }
    match world.loaded_block(below) {
        Some(below_block) if below_block == block => {
            fluid_level(world.get_metadata(below)) < FALLING_LEVEL
        }
        Some(below_block) => world.registry().get_properties(below_block).is_replaceable(),
        None => false,
    }
}

fn can_spread_into(world: &World, target: IVec3, block: BlockId, spread: u8) -> bool {
    if !in_world_height(target.y) {
        return false;
    }
    match world.loaded_block(target) {
        Some(target_block) if target_block == block => {
            fluid_level(world.get_metadata(target)) < spread
        }
        Some(target_block) => world.registry().get_properties(target_block).is_replaceable(),
        None => false,
    }
}

fn plan_write(plan: &mut FxHashMap<IVec3, Planned>, pos: IVec3, write: Planned) {
    match plan.entry(pos) {
        Entry::Vacant(entry) => {
            entry.insert(write);
        }
        Entry::Occupied(mut entry) => {
            let merged = merge(*entry.get(), write);
            entry.insert(merged);
        }
    }
}

/// Set beats clear; between two sets the higher level wins, ties go to the
/// lower block id.
fn merge(current: Planned, incoming: Planned) -> Planned {
    match (current, incoming) {
        (Planned::Clear, other) | (other, Planned::Clear) => other,
        (
            Planned::Set {
                block: a_block,
                level: a_level,
            },
            Planned::Set {
                block: b_block,
                level: b_level,
            },
        ) => {
            if a_level != b_level {
                if a_level > b_level {
                    current
                } else {
                    incoming
                }
            } else if a_block <= b_block {
                current
            } else {
                incoming
            }
        }
    }
}

fn apply_plan(world: &mut World, plan: FxHashMap<IVec3, Planned>) -> Vec<FluidChange> {
    let mut writes: Vec<(IVec3, Planned)> = plan.into_iter().collect();
    writes.sort_by_key(|(pos, _)| (pos.x, pos.y, pos.z));

    let mut changes = Vec::new();
    for (pos, write) in writes {
        let current = world.get_block(pos);
        match write {
            Planned::Set { block, level } => {
                if current == block && fluid_level(world.get_metadata(pos)) == level {
                    continue;
                }
                world.set_block_with_metadata(pos, block, level);
                changes.push(FluidChange {
                    world_pos: pos,
                    new_block: block,
                    metadata: level,
                });
            }
            Planned::Clear => {
                if !world.registry().is_fluid(current) {
                    continue;
                }
                world.set_block(pos, BlockId::AIR);
                changes.push(FluidChange {
                    world_pos: pos,
                    new_block: BlockId::AIR,
                    metadata: 0,
                });
            }
        }
    }
    changes
}
