use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_world::config::WorldSettings;

pub const USAGE: &str = "Usage: strata_server [--config <file.toml>] [--world <path>] [--seed <u64>] [--log-level <level>]";

/// Column the server keeps chunks streamed around.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnPoint {
    pub x: i32,
    pub z: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub world_path: PathBuf,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Ticks between fluid steps.
    pub fluid_tick_interval: u64,
    /// Chunk radius kept loaded around the spawn point.
    pub view_radius: i32,
    /// Ticks between saves of modified chunks.
    pub autosave_interval: u64,
    pub log_level: String,
    pub spawn: SpawnPoint,
    pub world: WorldSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            world_path: PathBuf::from("world"),
            tick_rate: 20,
            fluid_tick_interval: 5,
            view_radius: 4,
            autosave_interval: 600,
            log_level: "info".to_string(),
            spawn: SpawnPoint::default(),
            world: WorldSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|err| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid config {}: {err}", path.display()),
            )
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }

    pub fn max_log_level(&self) -> tracing::Level {
        self.log_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}

/// Command-line overrides layered on top of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub world: Option<PathBuf>,
    pub seed: Option<u64>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Run(CliArgs),
    Help,
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliAction, String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().ok_or("--config expects a path argument")?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--world" => {
                let value = args.next().ok_or("--world expects a path argument")?;
                parsed.world = Some(PathBuf::from(value));
            }
            "--seed" => {
                let value = args.next().ok_or("--seed expects a numeric argument")?;
                let seed = value
                    .parse::<u64>()
                    .map_err(|err| format!("invalid seed '{value}': {err}"))?;
                parsed.seed = Some(seed);
            }
            "--log-level" => {
                let value = args.next().ok_or("--log-level expects a level argument")?;
                if value.parse::<tracing::Level>().is_err() {
                    return Err(format!("invalid log level '{value}'"));
                }
                parsed.log_level = Some(value);
            }
            "--help" | "-h" => return Ok(CliAction::Help),
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(CliAction::Run(parsed))
}

impl CliArgs {
    pub fn resolve(&self) -> io::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(world) = &self.world {
            config.world_path = world.clone();
        }
        if let Some(seed) = self.seed {
            config.world.seed = seed;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
