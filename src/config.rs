use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Environment variable overriding the quarantine directory.
pub const QUARANTINE_ENV: &str = "ANCHORBEAT_QUARANTINE_DIR";

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the catalog database (snapshotted each cycle, never written).
    pub db_path: PathBuf,
    /// Root of the music library on disk.
    pub music_dir: PathBuf,
    /// Root of the curated anchor repository (FAST/MID/SLOW subdirectories).
    /// The audit CSV lives inside it.
    pub anchor_dir: PathBuf,
    /// Where unrecoverable files are moved. Overridable via
    /// `ANCHORBEAT_QUARANTINE_DIR`.
    pub quarantine_dir: PathBuf,
    /// Optional housekeeping executable run at the start of each cycle
    /// (skipped silently when the path does not exist).
    pub organize_hook: Option<PathBuf>,
    /// Hard budget for one ffmpeg repair invocation, in seconds.
    pub repair_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("/navidrome.db"),
            music_dir: PathBuf::from("/music"),
            anchor_dir: PathBuf::from("/anchors"),
            quarantine_dir: PathBuf::from("/quarantine"),
            organize_hook: None,
            repair_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/anchorbeat/config.toml`.
    /// Returns default config if the file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        if let Ok(dir) = std::env::var(QUARANTINE_ENV) {
            if !dir.is_empty() {
                config.quarantine_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_layout() {
        let c = AppConfig::default();
        assert_eq!(c.db_path, PathBuf::from("/navidrome.db"));
        assert_eq!(c.music_dir, PathBuf::from("/music"));
        assert_eq!(c.repair_timeout_secs, 30);
        assert!(c.organize_hook.is_none());
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let c: AppConfig = toml::from_str("music_dir = \"/srv/library\"").unwrap();
        assert_eq!(c.music_dir, PathBuf::from("/srv/library"));
        assert_eq!(c.db_path, PathBuf::from("/navidrome.db"));
        assert_eq!(c.quarantine_dir, PathBuf::from("/quarantine"));
    }
}
