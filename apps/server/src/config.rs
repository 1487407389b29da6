//! Server configuration.
//!
//! Supports loading from a YAML file with environment variable overrides,
//! mirrored on the teacher's `ServerConfig` (`apps/server/src/config.rs`):
//! a `#[serde(default)]` struct with a hand-written `Default`, `load()`
//! that reads-then-overrides, and CLI flags layered on top in `main.rs`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use amadeus_core::RoomConfiguration;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `AMADEUS_BIND_PORT`
    pub bind_port: u16,

    /// Path to a JSON manifest of `{audioPath, prompt, solution}` entries
    /// used by the fixture `SongLibrary`. When unset, a handful of
    /// built-in demo questions are used instead.
    /// Override: `AMADEUS_SONG_MANIFEST`
    pub song_manifest: Option<PathBuf>,

    /// Default per-room configuration (§3) handed to every room created by
    /// the registry; a room's host can still tune it in Lobby via future
    /// `/room/{id}/config` HTTP edits, which are out of this spec's scope.
    pub default_room: RoomConfigFile,
}

/// Wire/file shape of [`RoomConfiguration`] with the same field names and
/// defaults, kept distinct from the core type so the config file's shape
/// doesn't have to track `amadeus_core`'s wire `#[serde(rename_all)]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoomConfigFile {
    pub play_time: u32,
    pub guess_time: u32,
    pub review_time: u32,
    pub rounds: u32,
    pub max_players: usize,
}

impl Default for RoomConfigFile {
    fn default() -> Self {
        let defaults = RoomConfiguration::default();
        Self {
            play_time: defaults.play_time,
            guess_time: defaults.guess_time,
            review_time: defaults.review_time,
            rounds: defaults.rounds,
            max_players: defaults.max_players,
        }
    }
}

impl From<RoomConfigFile> for RoomConfiguration {
    fn from(file: RoomConfigFile) -> Self {
        Self {
            play_time: file.play_time,
            guess_time: file.guess_time,
            review_time: file.review_time,
            rounds: file.rounds,
            max_players: file.max_players,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 4173,
            song_manifest: None,
            default_room: RoomConfigFile::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AMADEUS_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("AMADEUS_SONG_MANIFEST") {
            self.song_manifest = Some(PathBuf::from(val));
        }
    }

    pub fn to_room_config(&self) -> RoomConfiguration {
        self.default_room.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_core_defaults() {
        let config = ServerConfig::default();
        let room = config.to_room_config();
        assert_eq!(room, RoomConfiguration::default());
    }

    #[test]
    fn loads_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("amadeus.yaml");
        std::fs::write(
            &path,
            "bind_port: 9000\ndefault_room:\n  rounds: 5\n  max_players: 2\n",
        )
        .unwrap();

        let config = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.default_room.rounds, 5);
        assert_eq!(config.default_room.max_players, 2);
    }

    #[test]
    fn bind_port_env_override_takes_precedence() {
        std::env::set_var("AMADEUS_BIND_PORT", "9100");
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.bind_port, 9100);
        std::env::remove_var("AMADEUS_BIND_PORT");
    }
}
