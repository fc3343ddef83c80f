//! Host configuration: a TOML file layered under CLI flag overrides, the
//! same layering `jgenesis-cli` applies over `jgenesis-native-config`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_save_states_dir() -> PathBuf {
    directories_save_states_dir()
}

fn directories_save_states_dir() -> PathBuf {
    std::env::temp_dir().join("emu-control-states")
}

fn default_socket_path() -> PathBuf {
    control_rpc::default_socket_path()
}

fn default_watched_path() -> PathBuf {
    state_bridge::default_watched_path()
}

fn default_notify_path() -> PathBuf {
    state_bridge::default_notify_path()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory holding `<baseName>_<slot>.mss` files and their sibling
    /// `.label` files.
    pub save_states_dir: PathBuf,
    /// Unix domain socket path the ControlRPC server binds.
    pub socket_path: PathBuf,
    /// Path the `StateBridge` watcher polls for externally-written states.
    pub watched_path: PathBuf,
    /// Path the `StateBridge` writes its notify file to.
    pub notify_path: PathBuf,
    /// Overrides `MESEN2_SAVE_STATE_SLOTS`/`OOS_SAVE_STATE_SLOTS` when `Some`.
    pub max_slot_index: Option<u32>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            save_states_dir: default_save_states_dir(),
            socket_path: default_socket_path(),
            watched_path: default_watched_path(),
            notify_path: default_notify_path(),
            max_slot_index: None,
        }
    }
}

impl HostConfig {
    /// Loads from `path` if present, falling back to defaults on any read
    /// or parse failure rather than aborting startup, matching
    /// `jgenesis-cli`'s "persist default config if missing" behavior.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) => {
                log::warn!("unable to read config file at '{}': {err}", path.display());
                return Self::default();
            }
        };

        toml::from_str(&contents).unwrap_or_else(|err| {
            log::error!("unable to deserialize config file at '{}': {err}", path.display());
            Self::default()
        })
    }

    pub fn persist_if_missing(&self, path: &std::path::Path) {
        if path.exists() {
            return;
        }

        match toml::to_string_pretty(self) {
            Ok(contents) => {
                if let Err(err) = std::fs::write(path, contents) {
                    log::error!("unable to persist default config to '{}': {err}", path.display());
                }
            }
            Err(err) => log::error!("unable to serialize default config: {err}"),
        }
    }
}

#[must_use]
pub fn default_config_path() -> PathBuf {
    std::env::current_dir().unwrap_or_default().join("emu-control-config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = HostConfig::load_or_default(std::path::Path::new("/nonexistent/config.toml"));
        assert_eq!(config.max_slot_index, None);
    }

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = HostConfig::default();
        config.max_slot_index = Some(42);
        config.persist_if_missing(&path);

        let loaded = HostConfig::load_or_default(&path);
        assert_eq!(loaded.max_slot_index, Some(42));
    }
}
