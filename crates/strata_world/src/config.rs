use serde::{Deserialize, Serialize};

/// Tunables for a single simulated world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldSettings {
    pub seed: u64,
    /// Extra chunks kept loaded past the caller's radius before eviction.
    pub unload_buffer: i32,
    /// Half-extent of the box reset by a local relight.
    pub relight_radius: i32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            unload_buffer: 2,
            relight_radius: 15,
        }
    }
}

impl WorldSettings {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorldSettings;

    #[test]
    fn defaults_match_documented_values() {
        let settings = WorldSettings::with_seed(42);
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.unload_buffer, 2);
        assert_eq!(settings.relight_radius, 15);
    }

    #[test]
    fn settings_survive_bincode() {
        let settings = WorldSettings {
            seed: 7,
            unload_buffer: 3,
            relight_radius: 9,
        };
        let bytes = bincode::serialize(&settings).expect("serialize settings");
        let decoded: WorldSettings = bincode::deserialize(&bytes).expect("deserialize settings");
        assert_eq!(decoded, settings);
    }
}
