use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::LoomConfig;

const CONFIG_FILENAME: &str = "loom.toml";

/// Load config from an explicit path.
pub fn load_config(path: &Path) -> anyhow::Result<LoomConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Search order: `./loom.toml`, then `~/.config/loom/loom.toml`. Returns
/// `LoomConfig::default()` if neither exists or fails to parse.
pub fn discover_and_load() -> LoomConfig {
    match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            match load_config(&path) {
                Ok(config) => config,
                Err(error) => {
                    warn!(path = %path.display(), %error, "failed to load config, using defaults");
                    LoomConfig::default()
                }
            }
        }
        None => {
            debug!("no config file found, using defaults");
            LoomConfig::default()
        }
    }
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    let candidate = config_dir()?.join(CONFIG_FILENAME);
    candidate.exists().then_some(candidate)
}

/// The user-global config directory (`~/.config/loom` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "loom").map(|dirs| dirs.config_dir().to_path_buf())
}

/// The user-global data directory (`~/.local/share/loom` on Linux) — where
/// `.loom-worktrees` metadata caches and downloaded binaries live.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "loom").map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| config_dir().unwrap_or_else(|| PathBuf::from(".")).join(CONFIG_FILENAME))
}

/// Serializes `config` to TOML and writes it to the user-global config path,
/// creating parent directories as needed.
pub fn save_config(config: &LoomConfig) -> anyhow::Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_minimal_toml_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loom.toml");
        std::fs::write(&path, "[deletion]\nretry_poll_interval_ms = 5000\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.deletion.retry_poll_interval_ms, 5000);
        assert!(config.idempotency.enabled);
    }

    #[test]
    fn load_config_rejects_an_unreadable_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("nowhere.toml")).is_err());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let config = LoomConfig { setup: crate::schema::SetupConfig { progress_throttle_ms: 250, ..Default::default() }, ..Default::default() };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: LoomConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }
}
