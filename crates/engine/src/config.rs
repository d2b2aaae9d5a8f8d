use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Engine tuning, read from `<config dir>/daw/engine.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Largest cycle the driver may request; bigger cycles count as an xrun.
    pub max_block_size: usize,
    pub history_depth: usize,
    pub command_queue_capacity: usize,
    pub status_queue_capacity: usize,
    pub capture_queue_capacity: usize,
    pub param_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            max_block_size: 4096,
            history_depth: 500,
            command_queue_capacity: 64,
            status_queue_capacity: 256,
            capture_queue_capacity: 1024,
            param_queue_capacity: 1024,
        }
    }
}

impl EngineConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("daw").join("engine.toml"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Loads the user's config, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml_str(&contents).unwrap_or_else(|err| {
                log::warn!("ignoring {}: {err}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };

        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }

        if let Ok(contents) = toml::to_string_pretty(self) {
            if let Err(err) = fs::write(&path, contents) {
                log::warn!("could not write {}: {err}", path.display());
            }
        }
    }
}
