//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use engagement_engine::{EngineConfig, EngineResult, FileStore, KeyValueStore, UnavailableStore};

const CONFIG_ENV: &str = "ENGAGEMENT_CONFIG";
const STATE_ENV: &str = "ENGAGEMENT_STATE";
const LOCAL_DIR: &str = ".engagement";

/// Resolve the config file path, if any source names one.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from(LOCAL_DIR).join("config.json");
    cwd_config.exists().then_some(cwd_config)
}

/// Resolve the cross-session state file path.
pub fn resolve_state_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(STATE_ENV) {
        return PathBuf::from(env_path);
    }

    let cwd_state = PathBuf::from(LOCAL_DIR).join("state.json");
    if cwd_state.exists() {
        return cwd_state;
    }

    resolve_default_state_path()
}

fn resolve_default_state_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(LOCAL_DIR).join("state.json")
}

/// Load the config strictly: any read, parse or validation problem is an error.
pub fn load_config_strict(path: &Path) -> EngineResult<EngineConfig> {
    let config = EngineConfig::from_file(path)?;
    config.validate()?;
    Ok(config)
}

/// Load the config for a live session. Problems are logged and the
/// built-in defaults are used instead.
pub fn load_config(explicit: Option<&str>) -> EngineConfig {
    let Some(path) = resolve_config_path(explicit) else {
        tracing::debug!("No config file, using defaults");
        return EngineConfig::default();
    };

    match EngineConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!("Loaded config: {}", path.display());
            config
        }
        Err(e) => {
            tracing::warn!("Ignoring config {}: {e}", path.display());
            EngineConfig::default()
        }
    }
}

/// Open the cross-session store. An unreadable state file makes storage
/// unavailable for this run rather than aborting.
pub fn open_state_store(path: &Path) -> Box<dyn KeyValueStore> {
    match FileStore::open(path) {
        Ok(store) => {
            tracing::info!("Using state file: {}", path.display());
            Box::new(store)
        }
        Err(e) => {
            tracing::warn!("State storage unavailable ({e}); frequency cap disabled for this run");
            Box::new(UnavailableStore)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_paths_win() {
        assert_eq!(
            resolve_config_path(Some("/tmp/c.json")),
            Some(PathBuf::from("/tmp/c.json"))
        );
        assert_eq!(
            resolve_state_path(Some("/tmp/s.json")),
            PathBuf::from("/tmp/s.json")
        );
    }

    #[test]
    fn test_bad_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ weights: nope").unwrap();

        let config = load_config(path.to_str());
        assert_eq!(config, EngineConfig::default());
        assert!(load_config_strict(&path).is_err());
    }

    #[test]
    fn test_strict_load_rejects_bad_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"weights":{"guide":0.9,"control":0.3}}"#).unwrap();

        assert!(load_config_strict(&path).is_err());
        // Lenient load keeps the table; the assigner falls back per session.
        assert!(load_config(path.to_str()).weights.validate().is_err());
    }

    #[test]
    fn test_huge_cooldown_rejected_strictly_and_defaulted_leniently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"cooldown_hours": 9000000000000}"#).unwrap();

        assert!(load_config_strict(&path).is_err());
        let config = load_config(path.to_str());
        assert_eq!(config.cooldown(), chrono::Duration::hours(24));
    }

    #[test]
    fn test_corrupt_state_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "][").unwrap();

        let store = open_state_store(&path);
        assert!(store.get("lastShownAt").is_err());
    }
}
