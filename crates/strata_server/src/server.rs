use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use strata_world::coords::world_to_chunk;
use strata_world::physics::{self, CollisionBox};

use crate::commands::{self, Command, HELP_LINES};
use crate::config::ServerConfig;
use crate::world::ServerWorld;

pub struct Server {
    config: ServerConfig,
    world: ServerWorld,
    tick: u64,
    running: Arc<AtomicBool>,
    command_rx: Receiver<Command>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        world: ServerWorld,
        running: Arc<AtomicBool>,
        command_rx: Receiver<Command>,
    ) -> Self {
        Self {
            config,
            world,
            tick: 0,
            running,
            command_rx,
        }
    }

    pub fn run(&mut self) {
        info!(
            "Starting Strata server at {} tps (world: {}, seed: {})",
            self.config.tick_rate,
            self.config.world_path.display(),
            self.world.world_seed()
        );
        let tick_duration = self.config.tick_duration();

        while self.running.load(Ordering::SeqCst) {
            let tick_start = Instant::now();

            self.handle_console_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.tick_once();

            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            } else {
                debug!("Tick {} overran by {:?}", self.tick, elapsed - tick_duration);
            }
        }

        info!("Server shutting down, saving world...");
        let saved = self.world.save_modified_chunks();
        info!("World saved ({saved} chunk(s)). Goodbye!");
    }

    /// One simulation step: stream, fluids, eviction, autosave.
    pub fn tick_once(&mut self) {
        let spawn = self.config.spawn;
        let radius = self.config.view_radius;

        self.world.stream_chunks(spawn.x, spawn.z, radius);

        self.tick += 1;
        let fluid_interval = self.config.fluid_tick_interval.max(1);
        if self.tick % fluid_interval == 0 {
            let changes = self.world.tick_fluids();
            if !changes.is_empty() {
                debug!(
                    "Fluid tick {}: {} change(s), {} active",
                    self.tick,
                    changes.len(),
                    self.world.world().active_fluid_count()
                );
            }
        }

        self.world.evict_far_chunks(spawn.x, spawn.z, radius);

        let autosave = self.config.autosave_interval;
        if autosave > 0 && self.tick % autosave == 0 {
            let saved = self.world.save_modified_chunks();
            if saved > 0 {
                info!("Autosaved {saved} chunk(s)");
            }
        }
    }

    fn handle_console_commands(&mut self) {
        while let Ok(command) = self.command_rx.try_recv() {
            match self.execute_console_command(command) {
                Ok(lines) => {
                    for line in lines {
                        info!("[CONSOLE] {line}");
                    }
                }
                Err(err) => warn!("[CONSOLE] {err}"),
            }
        }
    }

    /// Runs a console command, returning the lines to report.
    pub fn execute_console_command(&mut self, command: Command) -> Result<Vec<String>, String> {
        match command {
            Command::Noop => Ok(Vec::new()),
            Command::Stop => {
                info!("Shutdown requested via console /stop");
                self.running.store(false, Ordering::SeqCst);
                Ok(Vec::new())
            }
            Command::Help => {
                let mut lines = vec!["Available commands:".to_string()];
                lines.extend(HELP_LINES.iter().map(|line| format!("  {line}")));
                Ok(lines)
            }
            Command::Status => {
                let world = self.world.world();
                Ok(vec![format!(
                    "tick {}, seed {}, {} chunk(s) loaded, {} modified, {} pending edit(s), {} active fluid cell(s), {} unsaved snapshot(s)",
                    self.tick,
                    world.seed(),
                    world.chunk_count(),
                    world.modified_chunks().count(),
                    world.pending_edit_count(),
                    world.active_fluid_count(),
                    self.world.unsaved_snapshot_count()
                )])
            }
            Command::Save => {
                let saved = self.world.save_modified_chunks();
                Ok(vec![format!("saved {saved} chunk(s)")])
            }
            Command::SetBlock {
                pos,
                block,
                metadata,
            } => {
                let world = self.world.world_mut();
                let id = world
                    .registry()
                    .resolve(&block)
                    .ok_or_else(|| format!("unknown block '{block}'"))?;
                if !world.is_chunk_loaded(world_to_chunk(pos).0) {
                    info!("[CONSOLE] {pos} is not loaded; the edit is queued");
                }
                if metadata == 0 {
                    world.set_block(pos, id);
                } else {
                    world.set_block_with_metadata(pos, id, metadata);
                }
                let name = world.registry().get_properties(id).name.clone();
                Ok(vec![format!("set {pos} to {name} (meta {metadata})")])
            }
            Command::GetBlock(pos) => {
                let world = self.world.world();
                let block = world.get_block(pos);
                Ok(vec![format!(
                    "{pos}: {} (id {}, meta {}, light {})",
                    world.registry().get_properties(block).name,
                    block.0,
                    world.get_metadata(pos),
                    world.get_light(pos)
                )])
            }
            Command::Raycast {
                origin,
                direction,
                max_distance,
            } => {
                let world = self.world.world();
                Ok(vec![match physics::raycast(world, origin, direction, max_distance) {
                    Some(hit) => format!(
                        "hit {} at {} face {:?} distance {:.3}, place at {}",
                        world.registry().get_properties(hit.block).name,
                        hit.block_pos,
                        hit.face,
                        hit.distance,
                        hit.placement_pos()
                    ),
                    None => "no hit".to_string(),
                }])
            }
            Command::Collide {
                x,
                y,
                z,
                half_width,
                height,
            } => {
                let body = CollisionBox::new(x, y, z, half_width, height);
                let world = self.world.world();
                let blocks = physics::colliding_blocks(world, &body);
                let in_fluid = physics::fluid_intersection(world, &body);
                let summary = if blocks.is_empty() {
                    "no collision".to_string()
                } else {
                    let cells: Vec<String> = blocks.iter().map(ToString::to_string).collect();
                    format!("collides with {}", cells.join(", "))
                };
                Ok(vec![format!("{summary}; in fluid: {in_fluid}")])
            }
            Command::Highest { x, z } => {
                let y = self.world.world().highest_block_y(x, z);
                Ok(vec![format!("highest block at ({x}, {z}) is y={y}")])
            }
            Command::Tick(count) => {
                for _ in 0..count {
                    self.tick_once();
                }
                Ok(vec![format!("advanced {count} tick(s) to tick {}", self.tick)])
            }
            Command::InvalidUsage(message) => Err(message),
            Command::Unknown(input) => Err(format!("unknown command '{input}' (try /help)")),
        }
    }
}

pub fn run(config: ServerConfig, running: Arc<AtomicBool>) -> io::Result<()> {
    let world = ServerWorld::with_persistence(&config.world_path, config.world.clone());
    let (command_tx, command_rx) = mpsc::channel();
    spawn_console_command_thread(command_tx);

    let mut server = Server::new(config, world, running, command_rx);
    server.run();
    Ok(())
}

fn spawn_console_command_thread(command_tx: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line_result in stdin.lock().lines() {
            let line = match line_result {
                Ok(line) => line,
                Err(err) => {
                    warn!("Failed to read server console input: {err}");
                    break;
                }
            };

            let command = commands::parse_command(&line);
            if command_tx.send(command).is_err() {
                break;
            }
        }
    });
}
